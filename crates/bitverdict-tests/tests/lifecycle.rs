//! Integration tests for bitverdict-tests.
//!
//! These drive named presets end to end:
//! registry lookup -> context init -> chunked update -> finalize -> restart.

use bitverdict_tests::{
    AnyEngine, ContextState, EngineParams, PresetOptions, SparseOccupancy, SparseParams, Status,
    TestContext, TestError, UniversalEngine, UniversalParams, resolve,
};

fn lcg_bytes(seed: u64, n: usize) -> Vec<u8> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

fn preset(name: &str) -> EngineParams {
    resolve(name, &PresetOptions::default()).unwrap()
}

#[test]
fn nist_rank_grows_until_enough_matrices() {
    let params = preset("nist-rank");
    let data = lcg_bytes(7, 38 * 128);
    let mut ctx = TestContext::<AnyEngine>::with_params(&params).unwrap();
    let mut attempts = 0;
    for chunk in data.chunks(1000) {
        ctx.update(chunk, chunk.len() * 8).unwrap();
        attempts += 1;
        match ctx.finalize() {
            Ok(_) => break,
            Err(err) => {
                assert!(err.is_retryable(), "{err}");
                assert_eq!(ctx.state(), ContextState::Initialized);
            }
        }
    }
    assert_eq!(attempts, 5);
    assert_eq!(ctx.state(), ContextState::Finalized);
    let result = ctx.result().unwrap();
    assert_eq!(result.name, "nist-rank");
    assert_eq!(result.statistic2, Some(38.0));
    assert_eq!(result.discarded_bits, 0);
}

fn small_sparse() -> SparseParams {
    // 256-word space, 1500 words.
    SparseParams::custom(4, 2, 1500, 0.7, 0.8)
}

#[test]
fn identical_input_gives_identical_results() {
    let data = lcg_bytes(99, 48_480);
    let cases: Vec<(&str, EngineParams)> = vec![
        ("nist-rank", preset("nist-rank")),
        ("rank-32x32", preset("rank-32x32")),
        ("coron-universal", preset("coron-universal")),
        ("sparse 4x2", small_sparse().into()),
    ];
    for (name, params) in cases {
        let mut a = TestContext::<AnyEngine>::with_params(&params).unwrap();
        let mut b = TestContext::<AnyEngine>::with_params(&params).unwrap();
        let ra = a.test(&data, data.len() * 8).unwrap().clone();
        let rb = b.test(&data, data.len() * 8).unwrap().clone();
        assert_eq!(ra, rb, "{name}");
    }
}

#[test]
fn restart_isolates_trials() {
    let params = preset("rank-31x31");
    let first = lcg_bytes(1, 38 * 31 * 4);
    let second = lcg_bytes(2, 38 * 31 * 4);

    let mut fresh = TestContext::<AnyEngine>::with_params(&params).unwrap();
    let expected = fresh.test(&second, second.len() * 8).unwrap().clone();

    let mut ctx = TestContext::<AnyEngine>::with_params(&params).unwrap();
    ctx.test(&first, first.len() * 8).unwrap();
    ctx.restart(&params).unwrap();
    assert_eq!(ctx.state(), ContextState::Initialized);
    assert!(ctx.result().is_none());
    let again = ctx.test(&second, second.len() * 8).unwrap();
    assert_eq!(*again, expected);
}

#[test]
fn restart_clears_the_occupancy_bitmap() {
    let params = small_sparse();
    let first = lcg_bytes(5, 1501 * 4);
    // Second trial: only letter 0, so exactly one word is ever seen.
    let second = vec![0u8; 1501 * 4];

    let mut ctx = TestContext::<SparseOccupancy>::with_params(&params).unwrap();
    ctx.test(&first, first.len() * 8).unwrap();
    assert!(ctx.engine().unwrap().missing_words() < 16);

    ctx.restart(&params).unwrap();
    let engine = ctx.engine().unwrap();
    assert_eq!(engine.missing_words(), 256);
    assert_eq!(engine.strokes(), 0);

    let again = ctx.test(&second, second.len() * 8).unwrap().clone();
    assert_eq!(ctx.engine().unwrap().missing_words(), 255);
    let mut fresh = TestContext::<SparseOccupancy>::with_params(&params).unwrap();
    assert_eq!(*fresh.test(&second, second.len() * 8).unwrap(), again);
}

#[test]
fn restart_clears_the_last_occurrence_table() {
    let params = UniversalParams::maurer(6);
    let first = lcg_bytes(6, 48_480);
    let second = lcg_bytes(8, 48_480);

    let mut ctx = TestContext::<UniversalEngine>::with_params(&params).unwrap();
    ctx.test(&first, first.len() * 8).unwrap();
    assert!(ctx.engine().unwrap().last_seen(0).unwrap() > 0);

    ctx.restart(&params).unwrap();
    let engine = ctx.engine().unwrap();
    assert_eq!(engine.blocks(), 0);
    assert_eq!(engine.log_sum(), 0.0);
    assert!((0..64).all(|pattern| engine.last_seen(pattern) == Some(0)));

    let again = ctx.test(&second, second.len() * 8).unwrap().clone();
    let mut fresh = TestContext::<UniversalEngine>::with_params(&params).unwrap();
    assert_eq!(*fresh.test(&second, second.len() * 8).unwrap(), again);
}

#[test]
fn protocol_is_enforced_after_finalize() {
    let params = preset("maurer-universal");
    let data = lcg_bytes(3, 48_480);
    let mut ctx = TestContext::<AnyEngine>::with_params(&params).unwrap();
    ctx.test(&data, data.len() * 8).unwrap();
    assert!(matches!(
        ctx.update(&data, 8),
        Err(TestError::ProtocolViolation { op: "update", .. })
    ));
    assert!(matches!(
        ctx.finalize(),
        Err(TestError::ProtocolViolation { op: "finalize", .. })
    ));
    assert!(matches!(
        ctx.init(&params),
        Err(TestError::ProtocolViolation { op: "init", .. })
    ));
    ctx.free();
    ctx.free();
    assert_eq!(ctx.state(), ContextState::Uninitialized);
    assert!(matches!(
        ctx.update(&data, 8),
        Err(TestError::ProtocolViolation { .. })
    ));
}

#[test]
fn constant_stream_fails_the_rank_test() {
    let params = preset("rank-32x32");
    let data = vec![0xA5u8; 38 * 128];
    let mut ctx = TestContext::<AnyEngine>::with_params(&params).unwrap();
    let result = ctx.test(&data, data.len() * 8).unwrap();
    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.grade, 'F');
}

#[test]
fn byte_offset_presets_read_different_bytes() {
    // Only byte 2 of each stroke varies.
    let mut data = vec![0u8; 600 * 6 * 4];
    let noise = lcg_bytes(11, 600 * 6);
    for (stroke, &b) in data.chunks_mut(4).zip(&noise) {
        stroke[2] = b;
    }
    let run = |offset| {
        let options = PresetOptions {
            alpha: None,
            byte_offset: Some(offset),
        };
        let params = resolve("rank-6x8", &options).unwrap();
        let mut ctx = TestContext::<AnyEngine>::with_params(&params).unwrap();
        ctx.test(&data, data.len() * 8).unwrap().clone()
    };
    assert!(run(0).p_value < 1e-10);
    assert!(run(2).p_value > run(0).p_value);
}
