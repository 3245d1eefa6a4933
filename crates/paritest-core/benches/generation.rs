use criterion::{black_box, criterion_group, criterion_main, Criterion};

use paritest_core::generator::InputGenerator;
use paritest_core::model::{
    CharSet, Metadata, ParameterConstraint, ParameterDomain, QuestionDescriptor, Signature,
    TestingControl,
};
use paritest_core::value::ValueType;

fn descriptor(test_count: usize) -> QuestionDescriptor {
    QuestionDescriptor {
        metadata: Metadata {
            name: "bench".into(),
            ..Default::default()
        },
        question_type: Default::default(),
        signature: Signature::new(
            "mix",
            vec![ValueType::Int, ValueType::String, ValueType::IntArray],
            ValueType::Int,
        ),
        mode: Default::default(),
        parameters: ParameterDomain::Generate(vec![
            ParameterConstraint::Int { min: -100, max: 100 },
            ParameterConstraint::String {
                min_length: 0,
                max_length: 32,
                charset: CharSet::Printable,
                nullable: true,
            },
            ParameterConstraint::IntArray {
                min_length: 0,
                max_length: 16,
                min: -10,
                max: 10,
                nullable: false,
            },
        ]),
        features: Default::default(),
        control: TestingControl {
            test_count,
            max_test_count: test_count + 64,
            ..Default::default()
        },
    }
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");

    for count in [64, 1024] {
        let generator = InputGenerator::new(&descriptor(count), 124).unwrap();
        group.bench_function(format!("{count}_cases"), |b| {
            b.iter(|| black_box(generator.cases().count()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generation);
criterion_main!(benches);
