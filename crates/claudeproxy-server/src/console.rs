//! Runtime console
//!
//! A background reader on standard input: `R` re-executes the process with
//! the same arguments and environment, `Q` starts a graceful shutdown, `H`
//! prints the command list. Input is case-insensitive; anything else is
//! ignored.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Spawn the console reader
pub fn spawn(shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                () = shutdown.cancelled() => return,
            };
            let Ok(Some(line)) = line else {
                // stdin closed; nothing more to read
                return;
            };

            match line.trim().to_ascii_uppercase().as_str() {
                "R" => {
                    tracing::info!("restart requested; re-executing with the same arguments");
                    restart();
                }
                "Q" | "QUIT" => {
                    tracing::info!("quit requested; draining in-flight requests");
                    shutdown.cancel();
                    return;
                }
                "H" | "HELP" => {
                    tracing::info!("console commands: R = restart, Q = quit, H = help");
                }
                _ => {}
            }
        }
    })
}

/// Replace this process with a fresh copy of itself
///
/// On unix this is a true exec(2); elsewhere a child is spawned and the
/// current process exits.
fn restart() {
    let Ok(exe) = std::env::current_exe() else {
        tracing::error!("cannot locate current executable; restart aborted");
        return;
    };
    let args: Vec<String> = std::env::args().skip(1).collect();

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let error = std::process::Command::new(exe).args(args).exec();
        // exec only returns on failure
        tracing::error!(%error, "restart failed");
    }

    #[cfg(not(unix))]
    {
        match std::process::Command::new(exe).args(args).spawn() {
            Ok(_) => std::process::exit(0),
            Err(error) => tracing::error!(%error, "restart failed"),
        }
    }
}
