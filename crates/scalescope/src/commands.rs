//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use key_finder::{
    discover_midi_files, spawn_scan, AnalysisResult, FileAnalysis, HeuristicAnalyzer,
    MusicAnalyzer, ScanContext, ScanEvent, ScanOptions, ScanReport,
};
use preview::{
    list_output_ports, load_events, spawn_player, MidirSink, PlayerOptions, PlayerState,
    SessionOptions, SystemClock,
};
use scaleconf::{ConfigSources, ScalescopeConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn analyzer(config: &ScalescopeConfig) -> HeuristicAnalyzer {
    HeuristicAnalyzer::with_min_alternative_confidence(config.scan.min_alternative_confidence)
}

fn scan_options(config: &ScalescopeConfig, recursive: bool) -> ScanOptions {
    ScanOptions {
        extensions: config
            .scan
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect(),
        exclude: config.scan.exclude.clone(),
        recursive: config.scan.recursive && recursive,
        workers: config.scan.workers,
        ..ScanOptions::default()
    }
}

fn player_options(config: &ScalescopeConfig) -> PlayerOptions {
    PlayerOptions {
        poll_interval: Duration::from_millis(config.playback.poll_interval_ms.max(1)),
        session: SessionOptions {
            tolerance_beats: config.playback.tolerance_beats,
            completion_tail_beats: config.playback.completion_tail_beats,
        },
    }
}

fn describe(result: &AnalysisResult) -> String {
    let mut line = format!(
        "{} (confidence {:.2}), {:.1} bpm, {:.1}s, {} notes",
        result.key_name(),
        result.confidence,
        result.tempo_bpm,
        result.duration_seconds,
        result.note_count,
    );
    if let Some(ts) = result.time_signature {
        line.push_str(&format!(", {ts}"));
    }
    if !result.alternatives.is_empty() {
        let alternatives: Vec<String> = result
            .alternatives
            .iter()
            .map(|c| format!("{} {:.2}", c.key_name(), c.confidence))
            .collect();
        line.push_str(&format!(" [also: {}]", alternatives.join(", ")));
    }
    for change in &result.key_changes {
        line.push_str(&format!(
            "\n  {:.1}s: -> {}",
            change.time_seconds,
            change.key.key_name()
        ));
    }
    if !result.chord_progression.is_empty() {
        line.push_str(&format!("\n  chords: {}", result.chord_progression.join(" ")));
    }
    line
}

/// Analyze each file in turn on the blocking pool. Failures are logged
/// and skipped.
pub async fn analyze(config: &ScalescopeConfig, files: &[PathBuf], json: bool) -> Result<()> {
    let analyses = analyze_files(Arc::new(analyzer(config)), files, !json).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&analyses).context("Failed to serialize results")?
        );
    }
    Ok(())
}

async fn analyze_files(
    analyzer: Arc<dyn MusicAnalyzer>,
    files: &[PathBuf],
    print: bool,
) -> Result<Vec<FileAnalysis>> {
    let mut analyses = Vec::new();

    for path in files {
        let worker = Arc::clone(&analyzer);
        let task_path = path.clone();
        let outcome = tokio::task::spawn_blocking(move || worker.analyze_path(&task_path))
            .await
            .context("Analysis task panicked")?;

        match outcome {
            Ok(result) => {
                debug!(path = %path.display(), key = %result.key_name(), "analyzed");
                if print {
                    println!("{}: {}", path.display(), describe(&result));
                }
                analyses.push(FileAnalysis {
                    path: path.clone(),
                    result,
                });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping file");
                if print {
                    println!("{}: failed: {err}", path.display());
                }
            }
        }
    }
    Ok(analyses)
}

/// Batch-scan `roots`. Ctrl-C cancels between files.
pub async fn scan(
    config: &ScalescopeConfig,
    roots: &[PathBuf],
    recursive: bool,
    json: bool,
) -> Result<()> {
    let options = scan_options(config, recursive);
    let files = discover_midi_files(roots, &options);
    info!(files = files.len(), workers = options.workers, "starting scan");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, cancelling scan");
            signal_cancel.cancel();
        }
    });

    let ctx = ScanContext::new(options).with_cancel(cancel);
    let analyzer: Arc<dyn MusicAnalyzer> = Arc::new(analyzer(config));
    let (mut events, handle) = spawn_scan(analyzer, files, ctx);

    let mut report = None;
    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Progress {
                current,
                total,
                file_name,
            } => info!("[{current}/{total}] {file_name}"),
            ScanEvent::Done(done) => report = Some(done),
        }
    }
    handle.await.context("Scan task panicked")?;

    let Some(report) = report else {
        bail!("Scan ended without a report");
    };
    print_report(&report, json)
}

fn print_report(report: &ScanReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize scan report")?
        );
        return Ok(());
    }

    for analysis in &report.results {
        println!("{}: {}", analysis.path.display(), describe(&analysis.result));
    }
    for failure in &report.failures {
        println!("{}: failed: {}", failure.path.display(), failure.error);
    }
    println!(
        "\n{} files, {} analyzed, {} failed, {} unchanged in {:.2}s{}",
        report.total,
        report.analyzed,
        report.failed,
        report.unchanged,
        report.elapsed.as_secs_f64(),
        if report.cancelled { " (cancelled)" } else { "" },
    );
    Ok(())
}

/// Play `file` to a MIDI output until it completes or Ctrl-C.
pub async fn play(
    config: &ScalescopeConfig,
    file: &Path,
    port: Option<&str>,
    tempo: Option<f64>,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let decoded = tokio::task::spawn_blocking(move || midi_file::decode(&bytes))
        .await
        .context("Decode task panicked")?
        .with_context(|| format!("Failed to decode {}", file.display()))?;
    if load_events(&decoded).is_empty() {
        bail!("{} has no notes to play", file.display());
    }

    let port = port.unwrap_or(&config.playback.port);
    let sink = MidirSink::open(port, &config.playback.client_name)
        .with_context(|| format!("Failed to open MIDI output matching {port:?}"))?;
    println!("Playing {} on {}", file.display(), sink.port_name);

    let player = spawn_player(sink, SystemClock::new(), player_options(config));
    player.load(decoded).await?;
    player.play(tempo.or(config.playback.tempo)).await?;

    tokio::select! {
        status = player.wait_for_state(|s| s == PlayerState::Completed) => {
            let status = status?;
            info!(beats = status.position_beats, "playback complete");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, stopping playback");
            // playback may have completed just before the stop landed
            let status = player.stop_and_wait().await?;
            debug!(state = %status.state, "playback settled");
        }
    }

    let sink = player.shutdown().await?;
    debug!(messages = sink.messages_sent, "closed output");
    Ok(())
}

pub fn ports(config: &ScalescopeConfig) -> Result<()> {
    let ports = list_output_ports(&config.playback.client_name)
        .context("Failed to list MIDI output ports")?;
    if ports.is_empty() {
        println!("No MIDI output ports found");
    }
    for port in ports {
        println!("{}: {}", port.index, port.name);
    }
    Ok(())
}

pub fn show_config(config: &ScalescopeConfig, sources: &ConfigSources) {
    for file in &sources.files {
        println!("# loaded: {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# env: {var}");
    }
    print!("{}", config.to_toml());
}
