use std::io;
use std::process;
use std::thread;

use cmx_sweep::CancelFlag;

const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Listens for ctrl-c on a background thread.
///
/// The first interrupt raises `cancel`, which stops the campaign before its
/// next trial. A second interrupt exits at once.
pub fn install(cancel: CancelFlag) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("cmx-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        tracing::warn!(error = %err, "interrupt listener stopped");
                        return;
                    }
                    if on_interrupt(&cancel) {
                        process::exit(INTERRUPTED_EXIT_CODE);
                    }
                }
            });
        })?;
    Ok(())
}

/// Records one interrupt. Returns true when the process should exit now.
fn on_interrupt(cancel: &CancelFlag) -> bool {
    if cancel.is_raised() {
        tracing::error!("second interrupt; exiting without waiting for the current trial");
        return true;
    }
    cancel.raise();
    tracing::warn!("interrupt received; stopping after the current trial");
    false
}
