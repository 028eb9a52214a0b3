//! CLI command implementations
//!
//! Each client command opens its own connection, performs one operation
//! and reports the result on stdout. `serve` runs the engine on emulated
//! hardware instead.

pub mod attr;
pub mod crc;
pub mod erase;
pub mod flash;
pub mod info;
pub mod read;
pub mod serve;
pub mod user;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over `total` bytes, labelled with `phase`
pub(crate) fn progress_bar(total: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}
