use std::{env, process, sync::mpsc};

use anyhow::Context;
use git_mirror_watch::{logging, start, ConsoleSync, Dispatcher};

fn main() {
    if let Err(e) = logging::init() {
        eprintln!("failed to initialise logging: {e}");
    }

    if let Err(e) = run() {
        eprintln!("{:#}", e);
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let root = env::current_dir().context("failed to resolve current directory")?;

    let (event_tx, event_rx) = mpsc::channel();
    let (config, watcher) = start(&root, event_tx)?;
    tracing::info!(
        root = %root.display(),
        files = watcher.watch_set().len(),
        "watching for changes"
    );

    // Woken by a termination signal or by the dispatcher thread ending.
    let (stop_tx, stop_rx) = mpsc::channel();
    let dispatcher =
        Dispatcher::new(config, ConsoleSync::stdout()).spawn_supervised(event_rx, stop_tx.clone())?;

    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to install signal handler")?;

    let _ = stop_rx.recv();
    tracing::info!("shutting down");

    // Releasing the OS handle closes the event channel, which ends the dispatcher.
    drop(watcher);
    let stats = dispatcher.join().context("dispatcher stopped")?;
    tracing::debug!(?stats, "dispatcher stopped");
    Ok(())
}
