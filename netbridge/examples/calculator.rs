//! Remote calculator.
//!
//! A coordinator hands integer arithmetic to a pool of workers.
//!
//! ```bash
//! # all in one process: coordinator plus two workers
//! cargo run --example calculator -- demo
//!
//! # or as separate processes
//! cargo run --example calculator -- coordinator 127.0.0.1:1300
//! cargo run --example calculator -- worker 127.0.0.1:1300
//! ```
//!
//! Set `RUST_LOG=debug` to watch dispatch.

use futures::future::join_all;
use netbridge::dev_tracing::init_tracing;
use netbridge::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Calculation {
    op: Op,
    a: i64,
    b: i64,
}

impl Calculation {
    const fn new(op: Op, a: i64, b: i64) -> Self {
        Self { op, a, b }
    }
}

#[derive(Debug, thiserror::Error)]
enum CalcError {
    #[error("division by zero")]
    DivideByZero,
    #[error("{0:?} overflowed")]
    Overflow(Op),
}

fn evaluate(calc: Calculation) -> Result<i64, CalcError> {
    let Calculation { op, a, b } = calc;
    let value = match op {
        Op::Add => a.checked_add(b),
        Op::Subtract => a.checked_sub(b),
        Op::Multiply => a.checked_mul(b),
        Op::Divide if b == 0 => return Err(CalcError::DivideByZero),
        Op::Divide => a.checked_div(b),
    };
    value.ok_or(CalcError::Overflow(op))
}

async fn run_coordinator(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let options = CoordinatorOptions::default().with_endpoint(endpoint)?;
    let coordinator: Coordinator<Calculation, i64> = Coordinator::bind(options).await?;
    info!("Coordinator listening on {}", coordinator.local_addr());

    let monitor = coordinator.monitor();
    compio::runtime::spawn(async move {
        while let Ok(event) = monitor.recv_async().await {
            info!("[pool] {event}");
        }
    })
    .detach();

    let mut round = 0_i64;
    loop {
        round += 1;
        let calcs = [
            Calculation::new(Op::Add, round, 10),
            Calculation::new(Op::Multiply, round, round),
            Calculation::new(Op::Divide, 100, round % 3),
        ];
        let results = join_all(calcs.iter().map(|c| coordinator.run(*c))).await;
        for (calc, result) in calcs.iter().zip(results) {
            match result {
                Ok(value) => info!("{:?}({}, {}) = {value}", calc.op, calc.a, calc.b),
                Err(e) => warn!("{:?}({}, {}) failed: {e}", calc.op, calc.a, calc.b),
            }
        }
        compio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn run_worker(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let options = WorkerOptions::default().with_endpoint(endpoint)?;
    let mut worker = Worker::new(options, evaluate);
    info!("Worker serving {endpoint}");
    worker.run().await?;
    Ok(())
}

async fn run_demo() -> Result<(), Box<dyn std::error::Error>> {
    let options = CoordinatorOptions::default()
        .with_endpoint("127.0.0.1:0")?
        .with_task_timeout(Some(Duration::from_secs(5)));
    let coordinator: Coordinator<Calculation, i64> = Coordinator::bind(options).await?;
    let addr = coordinator.local_addr();
    info!("Coordinator listening on {addr}");

    let mut stoppers = Vec::new();
    for n in 1..=2 {
        let mut worker = Worker::new(WorkerOptions::default().with_coordinator(addr), evaluate);
        stoppers.push(worker.stopper());
        compio::runtime::spawn(async move {
            if let Err(e) = worker.run().await {
                warn!("worker {n} gave up: {e}");
            }
            info!("worker {n} answered {} task(s)", worker.tasks_completed());
        })
        .detach();
    }

    let calcs = [
        Calculation::new(Op::Add, 2, 3),
        Calculation::new(Op::Subtract, 10, 4),
        Calculation::new(Op::Multiply, 6, 7),
        Calculation::new(Op::Divide, 84, 2),
        Calculation::new(Op::Divide, 1, 0),
        Calculation::new(Op::Multiply, i64::MAX, 2),
    ];
    let results = join_all(calcs.iter().map(|c| coordinator.run(*c))).await;
    for (calc, result) in calcs.iter().zip(results) {
        match result {
            Ok(value) => println!("{:?}({}, {}) = {value}", calc.op, calc.a, calc.b),
            Err(e) => println!("{:?}({}, {}) -> {e}", calc.op, calc.a, calc.b),
        }
    }

    for stopper in &stoppers {
        stopper.stop();
    }
    coordinator.close();
    compio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_else(|| "demo".to_string());
    let endpoint = args
        .next()
        .unwrap_or_else(|| format!("127.0.0.1:{}", netbridge::DEFAULT_PORT));

    match mode.as_str() {
        "coordinator" => run_coordinator(&endpoint).await,
        "worker" => run_worker(&endpoint).await,
        "demo" => run_demo().await,
        other => {
            eprintln!("unknown mode {other:?}; expected coordinator, worker or demo");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate(Calculation::new(Op::Add, 2, 3)).unwrap(), 5);
        assert_eq!(evaluate(Calculation::new(Op::Subtract, 2, 3)).unwrap(), -1);
        assert_eq!(evaluate(Calculation::new(Op::Multiply, -4, 3)).unwrap(), -12);
        assert_eq!(evaluate(Calculation::new(Op::Divide, 7, 2)).unwrap(), 3);
        assert!(matches!(
            evaluate(Calculation::new(Op::Divide, 1, 0)),
            Err(CalcError::DivideByZero)
        ));
        assert!(matches!(
            evaluate(Calculation::new(Op::Add, i64::MAX, 1)),
            Err(CalcError::Overflow(Op::Add))
        ));
    }
}
