use std::io::Read;

use bitverdict_tests::{
    AnyEngine, EngineParams, PresetOptions, TestContext, TestError, TestResult, resolve,
};
use log::warn;
use serde::{Deserialize, Serialize};

use super::{
    InputSpec, TrialError, TrialInput, drive, fail, print_result_header, print_result_row,
};

/// One line of a battery plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanEntry {
    pub test: String,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub byte_offset: Option<u32>,
}

impl PlanEntry {
    pub fn options(&self) -> PresetOptions {
        PresetOptions {
            alpha: self.alpha,
            byte_offset: self.byte_offset,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
enum Outcome {
    Verdict(TestResult),
    Skipped { test: String, reason: String },
}

pub fn parse_plan(text: &str) -> Result<Vec<PlanEntry>, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn run(plan_path: &str, input: InputSpec<'_>, chunk: usize, json: bool) {
    if chunk == 0 {
        fail("--chunk must be at least 1 byte");
    }
    let text = std::fs::read_to_string(plan_path)
        .unwrap_or_else(|e| fail(format!("{plan_path}: {e}")));
    let plan = parse_plan(&text).unwrap_or_else(|e| fail(format!("{plan_path}: {e}")));
    if plan.is_empty() {
        fail(format!("{plan_path}: plan has no entries"));
    }

    // Resolve everything up front so a typo fails before any data is read.
    let mut resolved: Vec<(String, Option<EngineParams>, Option<String>)> = Vec::new();
    for entry in &plan {
        match resolve(&entry.test, &entry.options()) {
            Ok(params) => resolved.push((entry.test.clone(), Some(params), None)),
            Err(TestError::Unsupported(name)) => {
                warn!("battery: `{name}` has no engine, skipping");
                resolved.push((entry.test.clone(), None, Some("not implemented".into())));
            }
            Err(e) => fail(format!("plan entry `{}`: {e}", entry.test)),
        }
    }

    let mut data = Vec::new();
    input
        .open()
        .and_then(|mut r| r.read_to_end(&mut data))
        .unwrap_or_else(|e| fail(format!("{}: {e}", input.label())));

    if !json {
        println!(
            "Running {} test(s) over {} ({} bytes)\n",
            resolved.len(),
            input.label(),
            data.len()
        );
        print_result_header();
    }

    let mut buf = vec![0u8; chunk];
    let mut outcomes = Vec::with_capacity(resolved.len());
    for (test, params, skip) in resolved {
        let outcome = match (params, skip) {
            (Some(params), _) => run_entry(&params, &data, &mut buf)
                .map(Outcome::Verdict)
                .unwrap_or_else(|e| Outcome::Skipped {
                    test: test.clone(),
                    reason: e.to_string(),
                }),
            (None, reason) => Outcome::Skipped {
                test: test.clone(),
                reason: reason.unwrap_or_default(),
            },
        };
        if !json {
            match &outcome {
                Outcome::Verdict(result) => print_result_row(1, result),
                Outcome::Skipped { test, reason } => {
                    println!("  {test:<18} {:>5} skipped: {reason}", 1)
                }
            }
        }
        outcomes.push(outcome);
    }

    if json {
        match serde_json::to_string_pretty(&outcomes) {
            Ok(out) => println!("{out}"),
            Err(e) => fail(format!("serialising results: {e}")),
        }
    } else {
        let verdicts: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Verdict(r) => Some(r),
                Outcome::Skipped { .. } => None,
            })
            .collect();
        let passed = verdicts.iter().filter(|r| r.passed()).count();
        println!(
            "\n  {passed}/{} passed, {} skipped",
            verdicts.len(),
            outcomes.len() - verdicts.len()
        );
    }
}

fn run_entry(params: &EngineParams, data: &[u8], buf: &mut [u8]) -> Result<TestResult, TrialError> {
    let mut ctx = TestContext::<AnyEngine>::with_params(params)?;
    drive(&mut ctx, &mut TrialInput::new(data), buf)
}
