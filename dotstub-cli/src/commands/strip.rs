use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use dotstub::{
    Assembly, AssemblyCache, AssemblyWriter, PeImage, StripConfig, StripStats, Stripper,
};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_assembly},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct StripReport {
    file: String,
    output: String,
    stats: StripStats,
}

#[derive(Debug, Serialize)]
struct FailureReport {
    file: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct BatchReport {
    stripped: Vec<StripReport>,
    failed: Vec<FailureReport>,
}

pub struct StripOptions<'a> {
    pub config: StripConfig,
    pub search_dirs: &'a [PathBuf],
    pub global: &'a GlobalOptions,
}

/// Strip every input into `output_dir`.
///
/// Returns `Ok(false)` if at least one input failed; the other inputs are still written.
pub fn run(inputs: &[PathBuf], output_dir: &Path, opts: &StripOptions) -> anyhow::Result<bool> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("failed to create output directory: {}", output_dir.display())
    })?;

    let loaded: Vec<anyhow::Result<Assembly>> =
        inputs.par_iter().map(|path| load_assembly(path)).collect();

    // The inputs resolve each other's attributes in their unmodified form
    let mut cache = AssemblyCache::new(PeImage);
    for dir in opts.search_dirs {
        cache = cache.with_search_dir(dir);
    }
    for assembly in loaded.iter().flatten() {
        cache.insert(assembly.clone());
    }

    let stripper = Stripper::new(opts.config.clone());
    let results: Vec<anyhow::Result<StripReport>> = inputs
        .par_iter()
        .zip(loaded.into_par_iter())
        .map(|(path, assembly)| {
            let assembly = assembly?;
            strip_one(&stripper, &cache, path, assembly, output_dir)
        })
        .collect();

    let mut report = BatchReport {
        stripped: Vec::new(),
        failed: Vec::new(),
    };
    for (path, result) in inputs.iter().zip(results) {
        match result {
            Ok(stripped) => {
                if !opts.global.json {
                    println!("Writing {}", stripped.output);
                }
                report.stripped.push(stripped);
            }
            Err(error) => {
                if !opts.global.json {
                    eprintln!("error: {error:#}");
                }
                report.failed.push(FailureReport {
                    file: path.display().to_string(),
                    error: format!("{error:#}"),
                });
            }
        }
    }

    print_output(&report, opts.global, display_summary)?;

    Ok(report.failed.is_empty())
}

fn strip_one(
    stripper: &Stripper,
    cache: &AssemblyCache,
    path: &Path,
    mut assembly: Assembly,
    output_dir: &Path,
) -> anyhow::Result<StripReport> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("input has no file name: {}", path.display()))?;

    let stats = stripper
        .strip(&mut assembly, cache)
        .with_context(|| format!("failed to strip: {}", path.display()))?;

    // Encoded completely before the output file is created
    let data = PeImage
        .write(&assembly)
        .with_context(|| format!("failed to encode: {}", path.display()))?;

    let output = output_dir.join(file_name);
    std::fs::write(&output, data)
        .with_context(|| format!("failed to write output: {}", output.display()))?;

    log::debug!("{}: {} methods stubbed", file_display_name(path), stats.methods_stubbed);

    Ok(StripReport {
        file: path.display().to_string(),
        output: output.display().to_string(),
        stats,
    })
}

fn display_summary(report: &BatchReport) {
    if !report.stripped.is_empty() {
        println!();
        let mut tw = TabWriter::new(vec![
            ("File", Align::Left),
            ("Types", Align::Right),
            ("Fields", Align::Right),
            ("Methods", Align::Right),
            ("Properties", Align::Right),
            ("Events", Align::Right),
            ("Attributes", Align::Right),
            ("References", Align::Right),
            ("Rebased", Align::Right),
            ("Stubbed", Align::Right),
        ]);
        for stripped in &report.stripped {
            let stats = &stripped.stats;
            tw.row(vec![
                file_display_name(Path::new(&stripped.file)),
                format!("-{}", stats.types_removed),
                format!("-{}", stats.fields_removed),
                format!("-{}", stats.methods_removed),
                format!("-{}", stats.properties_removed),
                format!("-{}", stats.events_removed),
                format!("-{}", stats.attributes_removed),
                format!("-{}", stats.references_removed),
                stats.types_rebased.to_string(),
                stats.methods_stubbed.to_string(),
            ]);
        }
        tw.print();
    }

    let succeeded = report.stripped.len();
    let failed = report.failed.len();
    eprintln!();
    eprintln!(
        "Processed {} files: {} succeeded, {} failed",
        succeeded + failed,
        succeeded,
        failed
    );
}
