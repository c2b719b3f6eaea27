use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use horizon_common::{ObjectId, SectionIndex, Settings, StageId};
use horizon_kernel::{FrameLoop, SectionTable, SectionTableParams, StageLayout, StageWorld};
use horizon_render::{DebugTextSink, DrawSink, RecordingSink};
use horizon_timing::PacerHooks;
use horizon_tools::{CaptureReport, FrameTimer, LoopSummary, PacingInspector};
use horizon_visibility::{ExclusionStore, ExclusionTable, VisibilityWindow};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "horizon-cli", about = "Headless driver for frame pacing and the visibility window")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (YAML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Run paced frames on a generated stage and report timing
    Run {
        /// Number of frames to present
        #[arg(short, long, default_value = "120")]
        frames: u32,
        /// Override the configured target frame rate (0 = uncapped)
        #[arg(long)]
        fps: Option<u32>,
        /// Ticks of stage loading before movement starts
        #[arg(long, default_value = "0")]
        load_ticks: u32,
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Run a single visibility pass and print each object's node list
    Visible {
        /// Section the pass is centred on
        #[arg(short, long)]
        section: SectionIndex,
        /// Override the configured look-ahead
        #[arg(long)]
        ahead: Option<u32>,
        /// Override the configured look-behind
        #[arg(long)]
        behind: Option<u32>,
        /// Also report nodes first seen at the outermost look-ahead section
        #[arg(long)]
        capture: bool,
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Parse an exclusion file and report every skipped line
    CheckExclusions {
        path: PathBuf,
        /// Exit with an error if any line was skipped
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Args)]
struct StageArgs {
    /// Stage id
    #[arg(long, default_value = "1")]
    stage: u32,
    /// Seed for the generated section table and the stage RNG
    #[arg(long, default_value = "42")]
    seed: u64,
    /// Sections on the generated stage
    #[arg(long, default_value = "128")]
    sections: SectionIndex,
    /// Drawable objects on the generated stage
    #[arg(long, default_value = "4")]
    objects: usize,
}

impl StageArgs {
    fn build(&self) -> anyhow::Result<(StageWorld, SectionTable)> {
        let stage = StageId::new(self.stage)
            .with_context(|| format!("stage {} is out of range", self.stage))?;
        let layout = StageLayout {
            stage,
            max_section: self.sections,
            ..StageLayout::default()
        };
        let table = SectionTable::generate(&SectionTableParams {
            seed: self.seed,
            objects: self.objects,
            sections: self.sections,
            ..SectionTableParams::default()
        });
        Ok((StageWorld::with_seed(layout, self.seed), table))
    }
}

/// Headless stand-in for the presentation layer: there is no swap chain, so
/// tearing toggles are only logged.
struct HeadlessPresentation;

impl PacerHooks for HeadlessPresentation {
    fn set_tear_resistant(&mut self, enabled: bool) {
        tracing::info!(enabled, "tear-resistant presentation requested");
    }
}

#[derive(Serialize)]
struct RunReport {
    #[serde(flatten)]
    summary: LoopSummary,
    frame_ms_avg: f64,
    frame_ms_min: f64,
    frame_ms_max: f64,
}

#[derive(Serialize)]
struct VisibleReport {
    stage: u32,
    section: SectionIndex,
    sections_scanned: u32,
    nodes_emitted: u64,
    nodes_suppressed: u64,
    effective_ahead: u32,
    skip_sort: bool,
    objects: Vec<Vec<u16>>,
    capture: Option<CaptureReport>,
}

#[derive(Serialize)]
struct IssueReport {
    line: usize,
    message: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("horizon-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("visibility: {}", horizon_visibility::crate_info());
            println!("render: {}", horizon_render::crate_info());
            println!("tools: {}", horizon_tools::crate_info());
            println!("settings:\n{}", settings.to_yaml_string()?);
        }
        Commands::Run {
            frames,
            fps,
            load_ticks,
            stage,
        } => {
            let mut settings = settings;
            if let Some(fps) = fps {
                settings.pacing.target_fps = fps;
            }
            tracing::info!(
                frames,
                stage = stage.stage,
                target_fps = settings.pacing.target_fps,
                "running frames"
            );
            let (mut world, table) = stage.build()?;
            world.begin_load(load_ticks);
            let mut lp =
                FrameLoop::from_settings_with_hooks(&settings, world, table, HeadlessPresentation)?;

            let mut timer = FrameTimer::new(frames as usize);
            let mut sink = RecordingSink::new();
            for _ in 0..frames {
                let outcome = lp.run_frame(&mut sink);
                timer.record_ms(outcome.pacing.elapsed_ms);
            }

            let report = RunReport {
                summary: PacingInspector::frame_loop(&lp),
                frame_ms_avg: timer.average().as_secs_f64() * 1000.0,
                frame_ms_min: timer.min().as_secs_f64() * 1000.0,
                frame_ms_max: timer.max().as_secs_f64() * 1000.0,
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary);
                println!(
                    "Frame time: avg={:.3}ms min={:.3}ms max={:.3}ms",
                    report.frame_ms_avg, report.frame_ms_min, report.frame_ms_max
                );
            }
        }
        Commands::Visible {
            section,
            ahead,
            behind,
            capture,
            stage,
        } => {
            let mut vis = settings.visibility.clone();
            if let Some(ahead) = ahead {
                vis.ahead_span = ahead;
            }
            if let Some(behind) = behind {
                vis.behind_span = behind;
            }
            vis.debug_capture |= capture;

            let exclusions = Arc::new(ExclusionStore::new());
            if let Some(path) = &settings.exclusions {
                let report = exclusions.reload_from_path(path)?;
                tracing::debug!(entries = report.entries, issues = report.issues.len(), "exclusions loaded");
            }
            let (world, table) = stage.build()?;
            let mut window = VisibilityWindow::new(vis, exclusions);

            let mut recorder = RecordingSink::new();
            let summary = window.on_section_advanced(world.stage(), section, &table, &mut recorder);
            let capture = window.last_capture().map(CaptureReport::from_capture);

            if cli.json {
                let report = VisibleReport {
                    stage: stage.stage,
                    section,
                    sections_scanned: summary.sections_scanned,
                    nodes_emitted: summary.nodes_emitted,
                    nodes_suppressed: summary.nodes_suppressed,
                    effective_ahead: summary.effective_ahead,
                    skip_sort: summary.skip_sort,
                    objects: (0..summary.objects)
                        .map(|o| recorder.nodes(ObjectId(o as u8)).to_vec())
                        .collect(),
                    capture,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let mut text = DebugTextSink::new();
                for object in recorder.objects() {
                    if let Some(list) = recorder.list(object) {
                        text.draw_object(object, list);
                    }
                }
                print!("{}", text.output());
                println!(
                    "scanned {} sections, emitted {} nodes, suppressed {}, ahead {}{}",
                    summary.sections_scanned,
                    summary.nodes_emitted,
                    summary.nodes_suppressed,
                    summary.effective_ahead,
                    if summary.skip_sort { ", skip sort" } else { "" }
                );
                if let Some(capture) = capture {
                    print!("{capture}");
                }
            }
        }
        Commands::CheckExclusions { path, strict } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let (_table, report) = ExclusionTable::parse(&text);
            if cli.json {
                let issues: Vec<IssueReport> = report
                    .issues
                    .iter()
                    .map(|i| IssueReport {
                        line: i.line,
                        message: i.kind.to_string(),
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "stages": report.stages,
                        "entries": report.entries,
                        "skip_sort_stages": report.skip_sort_stages,
                        "issues": issues,
                    })
                );
            } else {
                println!(
                    "{}: {} stages, {} entries, {} skip-sort stages",
                    path.display(),
                    report.stages,
                    report.entries,
                    report.skip_sort_stages
                );
                for issue in &report.issues {
                    println!("  {issue}");
                }
            }
            if strict && !report.issues.is_empty() {
                anyhow::bail!("{} line(s) skipped", report.issues.len());
            }
        }
    }

    Ok(())
}
