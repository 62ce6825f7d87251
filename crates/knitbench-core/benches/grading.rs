use criterion::{black_box, criterion_group, criterion_main, Criterion};

use knitbench_core::bank::QuestionBank;
use knitbench_core::cases::SuiteContext;
use knitbench_core::extract::{choice_label, extract_code, final_number, int_vector};
use knitbench_core::model::{CaseKind, Language};

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    let reasoning = "First, 3 trays of 12 is 36 cookies. Then 36 - 14 = 22. \
                     Checking again: 12 * 3 = 36, minus 14 sold. The answer is 22.";
    let choice = "Options (A) and (C) are distractors. After elimination the answer is (D).";
    let vector = "Step 1: [1, 2, 3]\nStep 2: [2, 3, 4]\nFinal result: [4, 3, 2]";
    let code = "Here is the program:\n\n```python\nimport sys\nprint(sum(map(int, sys.stdin.read().split()[1:])))\n```\n";

    group.bench_function("final_number", |b| b.iter(|| final_number(black_box(reasoning))));
    group.bench_function("choice_label", |b| {
        b.iter(|| choice_label(black_box(choice), &['A', 'B', 'C', 'D']))
    });
    group.bench_function("int_vector", |b| b.iter(|| int_vector(black_box(vector))));
    group.bench_function("extract_code", |b| {
        b.iter(|| extract_code(black_box(code), Language::Python))
    });

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let ctx = SuiteContext::new(QuestionBank::builtin().expect("builtin bank")).with_seed(3);
    let mut group = c.benchmark_group("verify");

    for kind in [CaseKind::SudokuValidation, CaseKind::RandomSentenceObfuscation] {
        let query = kind.generate(&ctx).expect("generates").remove(0);
        let answer = query.expected.to_string();
        group.bench_function(kind.name(), |b| {
            b.iter(|| futures::executor::block_on(query.verify(black_box(&answer))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extraction, bench_verify);
criterion_main!(benches);
