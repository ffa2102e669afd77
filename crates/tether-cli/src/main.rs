use tether_core::{ActiveConfig, CallError, Host};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Counter {
    value: i64,
}

impl Counter {
    fn increment(&mut self) -> i64 {
        self.value += 1;
        self.value
    }

    fn add(&mut self, n: i64) -> i64 {
        self.value += n;
        self.value
    }
}

/// 行を溜めるだけの sink（出力の整形は持ち主の仕事）
#[derive(Debug, Default)]
struct LineCollector {
    lines: Vec<String>,
}

impl LineCollector {
    fn push(&mut self, line: String) -> usize {
        self.lines.push(line);
        self.lines.len()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // (A) Host が active object を所有し、呼び出し側は Handle だけを持つ
    let mut host = Host::new();
    let (counter_id, counter) = host.spawn_with(ActiveConfig::named("counter"), Counter::default());
    let (_, lines) = host.spawn_with(ActiveConfig::named("lines"), LineCollector::default());

    // (B) 生きている間は普通に結果が返る
    let first = counter.call(Counter::increment).await?;
    let second = counter.call_with(Counter::add, 41).await?;
    info!(first, second, "counter is alive");

    for word in ["alpha", "beta", "gamma"] {
        lines.call(move |c: &mut LineCollector| c.push(word.to_string()));
    }
    let collected = lines.call(|c: &mut LineCollector| c.lines.clone()).await?;
    info!(?collected, "lines collected");

    // (C) 別の Handle を id から取り直しておく
    let late = host.handle::<Counter>(counter_id)?;

    // (D) owner が counter を破棄すると、どの Handle からの call も TargetExpired
    host.retire_and_join(counter_id).await;
    for (label, handle) in [("original", &counter), ("late", &late)] {
        match handle.call(Counter::increment).await {
            Err(CallError::TargetExpired) => info!(label, "call after retire: target expired"),
            other => warn!(label, ?other, "unexpected outcome after retire"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&host.status())?);

    host.shutdown_and_join().await;
    Ok(())
}
