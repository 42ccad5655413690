use std::hint::black_box;

use bencher::RequestFixture;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_exchange::codec::RequestDecoder;
use micro_exchange::protocol::Message;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static FIXTURES: [RequestFixture; 3] = [
    RequestFixture::single("get_small", include_str!("../resources/request/get_small.txt")),
    RequestFixture::single("get_large", include_str!("../resources/request/get_large.txt")),
    RequestFixture::new("get_pipelined", include_str!("../resources/request/get_pipelined.txt"), 3),
];

fn benchmark_request_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_decoder");

    for fixture in &FIXTURES {
        group.throughput(Throughput::Bytes(fixture.bytes().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fixture.name()), fixture, |b, fixture| {
            let mut request_decoder = RequestDecoder::new();
            b.iter_batched_ref(
                || BytesMut::from(fixture.bytes()),
                |bytes_mut| {
                    for _ in 0..fixture.requests() {
                        let head = request_decoder.decode(bytes_mut).expect("fixture should hold valid requests");
                        assert!(matches!(head, Some(Message::Header(_))));
                        black_box(head);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_decoder);
criterion_main!(decoder);
