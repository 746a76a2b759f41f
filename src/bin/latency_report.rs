use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;

use mbo_book::{BookConfig, BookEvent, Engine, LadderKind, Side};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LadderArg {
    Tree,
    Array,
}

#[derive(Debug, Parser)]
#[command(about = "Per-event apply latency over a synthetic MBO stream")]
struct Args {
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u64,

    #[arg(long, value_enum, default_value_t = LadderArg::Tree)]
    ladder: LadderArg,

    /// Pin to the last CPU core before measuring
    #[arg(long)]
    pin: bool,
}

const MID: u64 = 100_000;

/// Synthetic feed: adds around a fixed mid, then a mix of cancels,
/// executes and modifies against resting orders.
struct Generator {
    state: u64,
    next_id: u64,
    sequence: u64,
    resting: Vec<(u64, Side, u32)>,
}

impl Generator {
    fn new() -> Self {
        Self { state: 0x2545_F491_4F6C_DD1D, next_id: 1, sequence: 0, resting: Vec::new() }
    }

    fn rand(&mut self) -> u64 {
        // LCG
        self.state = self.state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        self.state >> 33
    }

    fn next_event(&mut self) -> BookEvent {
        self.sequence += 1;
        let roll = self.rand() % 100;

        if self.resting.len() < 1_000 || roll < 50 {
            let side = if self.rand() % 2 == 0 { Side::Bid } else { Side::Ask };
            let offset = 1 + self.rand() % 100;
            let price = match side {
                Side::Bid => MID - offset,
                Side::Ask => MID + offset,
            };
            let qty = 1 + (self.rand() % 100) as u32;
            let order_id = self.next_id;
            self.next_id += 1;
            self.resting.push((order_id, side, qty));
            return BookEvent::add(order_id, side, price, qty, self.sequence);
        }

        let slot = (self.rand() % self.resting.len() as u64) as usize;
        let (order_id, side, qty) = self.resting[slot];
        match roll {
            50..=79 => {
                self.resting.swap_remove(slot);
                BookEvent::cancel(order_id, 0, self.sequence)
            }
            80..=89 => {
                self.resting.swap_remove(slot);
                BookEvent::execute(order_id, qty, self.sequence)
            }
            _ => {
                let offset = 1 + self.rand() % 100;
                let price = match side {
                    Side::Bid => MID - offset,
                    Side::Ask => MID + offset,
                };
                BookEvent::modify(order_id, side, price, qty, self.sequence)
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("Preparing Latency Benchmark...");

    let ladder = match args.ladder {
        LadderArg::Tree => LadderKind::Tree,
        LadderArg::Array => LadderKind::Array { base_price: MID - 1_000, tick_size: 1, slots: 2_000 },
    };
    let mut engine = Engine::new(BookConfig::default().with_capacity(1_000_000).with_ladder(ladder));
    if args.pin {
        engine.pin_to_core();
    }
    engine.warm_up();

    let mut generator = Generator::new();
    let events: Vec<BookEvent> = (0..args.iterations).map(|_| generator.next_event()).collect();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;
    let mut total_duration = Duration::ZERO;

    println!("Running {} iterations ({:?} ladder)...", args.iterations, args.ladder);

    for event in &events {
        // Critical measurement section
        let start = Instant::now();
        let _ = std::hint::black_box(engine.process(event));
        let elapsed = start.elapsed();

        // Saturate outliers instead of failing
        histogram.saturating_record(elapsed.as_nanos() as u64);
        total_duration += elapsed;
    }

    let stats = engine.stats();
    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", args.iterations);
    println!("Applied:    {}  Rejected: {}", stats.applied, stats.rejected);
    println!("Throughput: {:.2} ops/sec", args.iterations as f64 / total_duration.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:6} ns: {:10} count", v.value_iterated_to(), count);
        }
    }

    Ok(())
}
