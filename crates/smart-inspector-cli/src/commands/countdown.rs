use std::sync::Arc;

use anyhow::Result;
use smart_inspector::{Countdown, SystemClock};

use super::{Context, expiry_label};
use crate::cli::CountdownArgs;

/// Prints the expiry phrase each time it changes until `--updates` is
/// reached or Ctrl-C is pressed.
pub async fn countdown(ctx: &Context, args: &CountdownArgs) -> Result<()> {
    let mut countdown =
        Countdown::with_clock(args.exp, ctx.inspector.countdown_tick, Arc::new(SystemClock));
    let mut rx = countdown.subscribe();
    countdown.start();

    let mut printed = 0u32;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let phrase = rx.borrow_and_update().clone();
                println!("{}", expiry_label(&phrase));
                printed += 1;
                if args.updates.is_some_and(|max| printed >= max) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    countdown.stop();
    Ok(())
}
