//! Replay a market-by-order CSV through the book and write a BBO series.
//!
//! ```text
//! replay --input mbo.csv --output bbo.csv --every 1
//! RUST_LOG=mbo_book=debug replay --input mbo.csv --ladder array --base-price 0 --slots 200000
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use serde::Serialize;
use tracing::{info, warn};

use mbo_book::feed::{self, FeedError};
use mbo_book::{Book, BookConfig, CrossedBookPolicy, Engine, EventKind, LadderKind, Side};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LadderArg {
    Tree,
    Array,
}

#[derive(Debug, Parser)]
#[command(version, about = "Rebuild an order book from MBO events and emit top of book")]
struct Args {
    /// MBO CSV (ts_event,action,side,price,size,order_id,sequence)
    #[arg(short, long)]
    input: PathBuf,

    /// BBO CSV destination; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit a BBO row every N events
    #[arg(long, default_value_t = 1)]
    every: u64,

    #[arg(long, value_enum, default_value_t = LadderArg::Tree)]
    ladder: LadderArg,

    /// Lowest price of the array ladder window
    #[arg(long, default_value_t = 0)]
    base_price: u64,

    #[arg(long, default_value_t = 1)]
    tick_size: u64,

    /// Number of ticks in the array ladder window
    #[arg(long, default_value_t = 1 << 20)]
    slots: u32,

    /// Maximum resting orders
    #[arg(long, default_value_t = 1_000_000)]
    capacity: u32,

    /// Apply events that cross the book instead of rejecting them
    #[arg(long)]
    allow_crossed: bool,

    #[arg(long)]
    no_sequence_check: bool,

    /// Ignore fill records (feeds that follow every fill with a cancel)
    #[arg(long)]
    skip_fills: bool,
}

impl Args {
    fn book_config(&self) -> Result<BookConfig> {
        let ladder = match self.ladder {
            LadderArg::Tree => LadderKind::Tree,
            LadderArg::Array => LadderKind::Array {
                base_price: self.base_price,
                tick_size: self.tick_size,
                slots: self.slots,
            },
        };
        let crossed = if self.allow_crossed {
            CrossedBookPolicy::Allow
        } else {
            CrossedBookPolicy::Reject
        };
        let config = BookConfig::default()
            .with_capacity(self.capacity)
            .with_ladder(ladder)
            .with_crossed_book(crossed)
            .with_sequence_check(!self.no_sequence_check);
        config.validate().context("invalid book configuration")?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct BboRow {
    ts_event: String,
    bid_px: Option<u64>,
    bid_qty: Option<u64>,
    bid_ct: Option<u32>,
    /// Resting size across all bid levels
    bid_total: u64,
    ask_px: Option<u64>,
    ask_qty: Option<u64>,
    ask_ct: Option<u32>,
    ask_total: u64,
}

impl BboRow {
    fn new(ts_event: u64, book: &Book) -> Self {
        let bbo = book.bbo();
        Self {
            ts_event: feed::format_ts(ts_event),
            bid_px: bbo.bid.map(|l| l.price),
            bid_qty: bbo.bid.map(|l| l.qty),
            bid_ct: bbo.bid.map(|l| l.count),
            bid_total: book.total_qty(Side::Bid),
            ask_px: bbo.ask.map(|l| l.price),
            ask_qty: bbo.ask.map(|l| l.qty),
            ask_ct: bbo.ask.map(|l| l.count),
            ask_total: book.total_qty(Side::Ask),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mbo_book=info,replay=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = args.book_config()?;
    info!(?config, input = %args.input.display(), "starting replay");

    let input = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut writer = csv::Writer::from_writer(sink);

    let mut engine = Engine::new(config);
    engine.warm_up();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3)?;
    let every = args.every.max(1);
    let mut decoded = 0u64;
    let mut undecodable = 0u64;
    let started = Instant::now();

    for result in feed::read_events(BufReader::new(input)) {
        let event = match result {
            Ok(event) => event,
            Err(FeedError::Csv(err)) if err.is_io_error() => {
                return Err(err).context("reading feed");
            }
            Err(err) => {
                undecodable += 1;
                warn!(error = %err, "record skipped");
                continue;
            }
        };
        if args.skip_fills && event.kind == EventKind::Execute {
            continue;
        }

        let start = Instant::now();
        // Rejections are counted and logged by the engine
        let _ = engine.process(&event);
        histogram.record(start.elapsed().as_nanos() as u64).unwrap_or(());

        decoded += 1;
        if decoded % every == 0 {
            writer.serialize(BboRow::new(event.ts_event, &engine.book))?;
        }
        if decoded % 1_000_000 == 0 {
            info!(events = decoded, orders = engine.order_count(), "progress");
        }
    }
    writer.flush()?;

    let stats = engine.stats();
    let elapsed = started.elapsed();
    info!(
        events = decoded,
        applied = stats.applied,
        rejected = stats.rejected,
        skipped = stats.skipped,
        undecodable,
        resting = engine.order_count(),
        secs = elapsed.as_secs_f64(),
        "replay finished"
    );
    if histogram.len() > 0 {
        info!(
            p50 = histogram.value_at_quantile(0.50),
            p99 = histogram.value_at_quantile(0.99),
            p999 = histogram.value_at_quantile(0.999),
            max = histogram.max(),
            "apply latency (ns)"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["replay", "--input", "mbo.csv"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_bad_config_is_an_error() {
        assert!(args(&["--ladder", "array", "--tick-size", "0"]).book_config().is_err());
        assert!(args(&["--capacity", "4294967295"]).book_config().is_err());
        assert!(args(&["--ladder", "array", "--tick-size", "5"]).book_config().is_ok());
    }

    #[test]
    fn test_rows_carry_side_totals() {
        let feed = "ts_event,action,side,price,size,order_id,sequence\n\
                    2024-03-01T14:30:00Z,A,B,100,10,1,1\n\
                    2024-03-01T14:30:01Z,A,B,99,7,2,2\n\
                    2024-03-01T14:30:02Z,A,A,101,5,3,3\n";
        let mut engine = Engine::new(BookConfig::default().with_capacity(16));
        let mut writer = csv::Writer::from_writer(Vec::new());
        for event in feed::read_events(feed.as_bytes()) {
            let event = event.unwrap();
            engine.process(&event).unwrap();
            writer.serialize(BboRow::new(event.ts_event, &engine.book)).unwrap();
        }
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(
            lines[0],
            "ts_event,bid_px,bid_qty,bid_ct,bid_total,ask_px,ask_qty,ask_ct,ask_total"
        );
        // Second bid is worse: the best level is unchanged, the side total grows
        assert!(lines[2].ends_with(",100,10,1,17,,,,0"), "{}", lines[2]);
        assert!(lines[3].ends_with(",100,10,1,17,101,5,1,5"), "{}", lines[3]);
    }
}
