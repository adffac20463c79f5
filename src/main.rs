use anyhow::{Context, Result};
use clap::Parser;
use switchback::aggregate::{aggregate, GroupBy};
use switchback::assemble::assemble;
use switchback::catalog::MetricCatalog;
use switchback::cli::{Cli, OutputFormat};
use switchback::config::AnalysisConfig;
use switchback::csv_output::CsvOutput;
use switchback::events::EventTables;
use switchback::json_output::JsonOutput;
use switchback::report;
use switchback::segment::{arm_profile, sweep, SegmentationConfig};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_toml(path)?,
        None => AnalysisConfig::default(),
    };

    if let Some(alpha) = cli.alpha {
        config.test.significance_level = alpha;
    }
    if let Some(control) = &cli.control {
        config.groups.control = control.clone();
    }
    if let Some(treatment) = &cli.treatment {
        config.groups.treatment = treatment.clone();
    }
    if cli.catalog.is_some() {
        config.catalog = cli.catalog.clone();
    }
    if cli.wants_sweep() && config.segmentation.is_none() {
        config.segmentation = Some(SegmentationConfig::default());
    }
    if cli.parallel {
        if let Some(segmentation) = config.segmentation.as_mut() {
            segmentation.parallel = true;
        }
    }

    config.validate()?;
    Ok(config)
}

fn load_catalog(cli: &Cli, config: &AnalysisConfig) -> Result<MetricCatalog> {
    let catalog = match &config.catalog {
        Some(path) => MetricCatalog::from_toml(path)?,
        None => MetricCatalog::default_catalog()?,
    };
    catalog.validate()?;
    if cli.metrics.is_empty() {
        Ok(catalog)
    } else {
        Ok(catalog.select(&cli.metrics)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = load_config(&cli)?;
    let catalog = load_catalog(&cli, &config)?;

    if cli.list_metrics {
        for metric in catalog.metrics() {
            println!("{} = {} / {}", metric.name, metric.numerator, metric.denominator);
        }
        return Ok(());
    }

    let Some(input) = &cli.input else {
        anyhow::bail!("--input <FILE> is required (see --help)");
    };
    let tables = EventTables::from_json_file(input)?;
    tracing::debug!(
        "loaded {} rows from {} tables",
        tables.total_rows(),
        tables.names().count()
    );

    let table = aggregate(&tables, catalog.aggregates(), &GroupBy::clusters());
    let totals = assemble(&catalog, &table, &config.groups, &config.test)?;

    let mut segments = None;
    let mut profile = None;
    if cli.wants_sweep() {
        let segmentation = config
            .segmentation
            .as_ref()
            .context("segmentation settings missing")?;
        segments = Some(sweep(&tables, &catalog, &config.groups, segmentation, &config.test)?);
        if cli.profile {
            profile = Some(arm_profile(&tables, &catalog, segmentation)?);
        }
    }

    match cli.format {
        OutputFormat::Text => {
            print!("{}", report::results_report(&totals));
            if let Some(segments) = &segments {
                println!();
                print!("{}", report::sweep_report(segments));
                for metric in &cli.heatmaps {
                    let heatmap = segments
                        .heatmap(metric, cli.heatmap_stat)
                        .with_context(|| format!("unknown metric for heatmap: {metric}"))?;
                    println!();
                    print!("{}", report::heatmap_grid(&heatmap));
                }
            }
            if let Some(points) = &profile {
                println!();
                println!("📉 Arm profile ({} points):", points.len());
                for p in points {
                    let value = p.value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string());
                    println!(
                        "  {} {} ({}, {}): {}",
                        p.metric, p.arm, p.primary_bin, p.secondary_bin, value
                    );
                }
            }
        }
        OutputFormat::Csv => match &segments {
            Some(segments) => print!("{}", CsvOutput::from_sweep(segments).to_csv()),
            None => print!("{}", CsvOutput::from_results(&totals).to_csv()),
        },
        OutputFormat::Json => {
            let mut output = JsonOutput::new();
            output.set_totals(totals);
            if let Some(segments) = segments {
                output.set_segments(segments);
            }
            if let Some(points) = profile {
                output.set_profile(points);
            }
            println!("{}", output.to_json()?);
        }
    }

    Ok(())
}
