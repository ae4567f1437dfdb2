//! Offline mixdown CLI
//!
//! Reads per-stem WAVs from a directory, optionally applies a saved entry
//! state, renders one loop and writes the mixdown:
//!
//! ```text
//! render-mix <stem-dir> [output.wav] [state.json]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use basedrop::Shared;

use stemlab_core::control::EntryState;
use stemlab_core::engine::gc::gc_handle;
use stemlab_core::export::{default_mixdown_path, render_mixdown, write_wav, MasterSettings};
use stemlab_core::supply::{StemSupply, WavDirectorySupply};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        bail!("usage: render-mix <stem-dir> [output.wav] [state.json]");
    }

    let stem_dir = PathBuf::from(&args[0]);
    let output = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_mixdown_path(Path::new(".")));

    let state = match args.get(2) {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("reading state file {}", path))?;
            serde_json::from_str::<EntryState>(&data)
                .with_context(|| format!("parsing state file {}", path))?
        }
        None => EntryState::default(),
    };

    let stems = WavDirectorySupply::new(&stem_dir)
        .fetch()
        .with_context(|| format!("loading stems from {}", stem_dir.display()))?;
    let sample_rate = stems.sample_rate();

    println!(
        "Loaded stems [{}], {:.2}s loop at {}Hz, tempo {:.2}",
        stems.available().map(|s| s.name()).collect::<Vec<_>>().join(", "),
        stems.loop_seconds(),
        sample_rate,
        state.tempo,
    );

    let stems = Shared::new(&gc_handle(), stems);
    let mix = render_mixdown(&stems, &state, MasterSettings::default());
    write_wav(&mix, sample_rate, &output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Wrote {} ({} frames)", output.display(), mix.len());
    Ok(())
}
