use fuzzybot::config::{self, KioskConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fuzzybot=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(any(feature = "desktop", feature = "web", feature = "mobile"))]
fn main() {
    config::load_env();
    init_tracing();
    tracing::info!(demo = KioskConfig::from_env().demo_mode, "starting kiosk");
    dioxus::launch(fuzzybot::ui::App);
}

#[cfg(not(any(feature = "desktop", feature = "web", feature = "mobile")))]
fn main() -> anyhow::Result<()> {
    // Env must be settled before the runtime starts its worker threads.
    config::load_env();
    init_tracing();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_console(KioskConfig::from_env()))
}

#[cfg(not(any(feature = "desktop", feature = "web", feature = "mobile")))]
async fn run_console(config: KioskConfig) -> anyhow::Result<()> {
    use fuzzybot::console::ConsoleView;
    use fuzzybot::{Kiosk, KioskInput, PhysicalKey};
    use tokio::io::{AsyncBufReadExt, BufReader};

    let source = config.response_source();
    let (tx, rx) = futures::channel::mpsc::unbounded();

    tx.unbounded_send(KioskInput::DismissIntro)?;
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let sent = tx
                        .unbounded_send(KioskInput::Paste(line))
                        .and_then(|()| tx.unbounded_send(KioskInput::Key(PhysicalKey::Enter)));
                    if sent.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });

    let kiosk = Kiosk::new(config, source, ConsoleView::new(std::io::stdout()));
    kiosk.run(rx).await;
    Ok(())
}
