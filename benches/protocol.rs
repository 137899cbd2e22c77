//! Wire-record decode benchmarks
//!
//! The SMART and health records are decoded on every poll tick for every
//! managed drive; identify only at initialization, but its 4 KiB buffer
//! makes it the heaviest parse.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nvme_device_manager::protocol::{
    IdentifyController, SanitizeLog, SmartLog, SubsystemHealthStatus,
};
use nvme_device_manager::transport::mock;

fn bench_identify_decode(c: &mut Criterion) {
    let buf = mock::identify_controller_bytes(
        0x144d,
        "S7X9NX0T123456",
        "PM9A3 NVMe SSD",
        "GDC7302Q",
        1_920_398_934_016,
        0x7 | (0x2 << 30),
    );
    c.bench_function("identify_controller_decode", |b| {
        b.iter(|| IdentifyController::decode(black_box(&buf)).unwrap())
    });
}

fn bench_smart_decode(c: &mut Criterion) {
    let buf = mock::smart_log_bytes(0x02, 350, 40);
    c.bench_function("smart_log_decode", |b| {
        b.iter(|| SmartLog::decode(black_box(&buf)).unwrap())
    });
}

fn bench_sanitize_log_decode(c: &mut Criterion) {
    let buf = mock::sanitize_log_bytes(&SanitizeLog {
        sstat: 0x0002,
        eto: 7200,
        ..Default::default()
    });
    c.bench_function("sanitize_log_decode", |b| {
        b.iter(|| SanitizeLog::decode(black_box(&buf)).unwrap())
    });
}

fn bench_health_decode(c: &mut Criterion) {
    let buf = [0x20u8, 0x02, 0x45, 40, 0x00, 0x00, 0x00, 0x00];
    c.bench_function("health_status_decode", |b| {
        b.iter(|| SubsystemHealthStatus::decode(black_box(&buf)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_identify_decode,
    bench_smart_decode,
    bench_sanitize_log_decode,
    bench_health_decode
);
criterion_main!(benches);
