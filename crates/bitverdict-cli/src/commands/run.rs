use bitverdict_tests::{AnyEngine, PresetOptions, TestContext, TestEngine, resolve};
use log::info;

use super::{InputSpec, TrialInput, drive, fail, print_result_header, print_result_row};

pub struct RunCommandConfig<'a> {
    pub test: &'a str,
    pub input: InputSpec<'a>,
    pub alpha: Option<f64>,
    pub chunk: usize,
    pub byte_offset: Option<u32>,
    pub trials: usize,
    pub json: bool,
}

pub fn run(cfg: RunCommandConfig<'_>) {
    if cfg.chunk == 0 {
        fail("--chunk must be at least 1 byte");
    }
    let options = PresetOptions {
        alpha: cfg.alpha,
        byte_offset: cfg.byte_offset,
    };
    let params = resolve(cfg.test, &options).unwrap_or_else(|e| fail(e));
    let reader = cfg
        .input
        .open()
        .unwrap_or_else(|e| fail(format!("{}: {e}", cfg.input.label())));
    let mut input = TrialInput::new(reader);
    let mut buf = vec![0u8; cfg.chunk];

    if !cfg.json {
        println!(
            "Running {} over {} ({} trial(s), alpha {})\n",
            params.descriptor().name,
            cfg.input.label(),
            cfg.trials,
            params.alpha()
        );
        print_result_header();
    }

    let mut ctx = TestContext::<AnyEngine>::new();
    let mut results = Vec::with_capacity(cfg.trials);
    for trial in 1..=cfg.trials {
        ctx.restart(&params).unwrap_or_else(|e| fail(e));
        let result = match drive(&mut ctx, &mut input, &mut buf) {
            Ok(result) => result,
            Err(e) => fail(format!("trial {trial}: {e}")),
        };
        info!(
            "trial {trial}: {} after {} bits",
            result.status,
            ctx.engine().map_or(0, |e| e.bits_seen())
        );
        if !cfg.json {
            print_result_row(trial, &result);
        }
        results.push(result);
    }
    ctx.free();

    if cfg.json {
        match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{json}"),
            Err(e) => fail(format!("serialising results: {e}")),
        }
    } else {
        let passed = results.iter().filter(|r| r.passed()).count();
        println!("\n  {passed}/{} trial(s) passed", results.len());
    }
}
