//! Command implementations. Each writes its human or JSON output to `out`.

use crate::output::{
    parse_statuses, render_documents, render_remediation, render_rules, render_summary,
    render_table,
};
use anyhow::Context;
use compliance_core::config::AppConfig;
use compliance_core::pipeline::{self, CheckOutcome};
use compliance_core::report::{self, filter_by_status, remediation_view, ComplianceReport};
use indicatif::{ProgressBar, ProgressStyle};
use providers::ProviderRegistry;
use std::io::Write;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn rules(cfg: &AppConfig, category: Option<&str>, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let catalog = pipeline::load_catalog(cfg)?;
    let groups: BTreeMap<_, _> = catalog
        .by_category()
        .into_iter()
        .filter(|(name, _)| category.map_or(true, |c| name.eq_ignore_ascii_case(c)))
        .collect();
    if json {
        let rules: Vec<_> = groups.values().flatten().collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&rules)?)?;
    } else if groups.is_empty() {
        writeln!(out, "No rules match.")?;
    } else {
        write!(out, "{}", render_rules(&groups))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct CheckArgs {
    pub path: PathBuf,
    pub rules: Vec<String>,
    pub json: bool,
    pub csv: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub save: bool,
    pub progress: bool,
}

fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb
}

fn write_exports(
    report: &ComplianceReport,
    csv: Option<&PathBuf>,
    json_out: Option<&PathBuf>,
    evidence_limit: usize,
) -> anyhow::Result<()> {
    if let Some(path) = json_out {
        std::fs::write(path, report::to_json(report)?)
            .with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON report");
    }
    if let Some(path) = csv {
        std::fs::write(path, report::to_csv(report, evidence_limit))
            .with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "wrote CSV report");
    }
    Ok(())
}

fn print_report(
    report: &ComplianceReport,
    json: bool,
    evidence_limit: usize,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", report::to_json(report)?)?;
    } else {
        write!(out, "{}", render_summary(report))?;
        writeln!(out)?;
        write!(out, "{}", render_table(report, evidence_limit))?;
    }
    Ok(())
}

pub async fn check(
    cfg: &AppConfig,
    registry: &ProviderRegistry,
    args: &CheckArgs,
    out: &mut impl Write,
) -> anyhow::Result<CheckOutcome> {
    let pb = progress_bar(args.progress);
    let outcome = pipeline::check_document(cfg, registry, &args.path, &args.rules, |p| {
        pb.set_length(p.total as u64);
        pb.set_position(p.completed as u64);
        pb.set_message(format!("{} {}", p.rule_id, p.status));
    })
    .await;
    pb.finish_and_clear();
    let outcome = outcome?;

    let limit = cfg.report.evidence_limit;
    write_exports(&outcome.report, args.csv.as_ref(), args.out.as_ref(), limit)?;
    if args.save {
        let pool = pipeline::open_database(cfg).await?;
        pipeline::save_report(&pool, &outcome.document, &outcome.report, &outcome.catalog).await?;
    }
    if !args.json {
        writeln!(
            out,
            "{}: {} pages, {} chunks, {} rules checked",
            outcome.document,
            outcome.pages,
            outcome.chunks,
            outcome.report.len()
        )?;
    }
    print_report(&outcome.report, args.json, limit, out)?;
    Ok(outcome)
}

pub async fn report(
    cfg: &AppConfig,
    document: &str,
    statuses: &[String],
    json: bool,
    csv: Option<&PathBuf>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let statuses = parse_statuses(statuses)?;
    let pool = pipeline::open_database(cfg).await?;
    let report = pipeline::load_report(&pool, document, &statuses).await?;
    if report.is_empty() && statuses.is_empty() {
        anyhow::bail!("no stored report for {document}");
    }
    write_exports(&report, csv, None, cfg.report.evidence_limit)?;
    print_report(&report, json, cfg.report.evidence_limit, out)
}

/// Renders a report previously exported with `check --out`.
pub fn show(
    cfg: &AppConfig,
    path: &Path,
    statuses: &[String],
    json: bool,
    csv: Option<&PathBuf>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let statuses = parse_statuses(statuses)?;
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut report =
        report::from_json(&raw).with_context(|| format!("parse report {}", path.display()))?;
    if !statuses.is_empty() {
        report = filter_by_status(&report, &statuses);
    }
    write_exports(&report, csv, None, cfg.report.evidence_limit)?;
    print_report(&report, json, cfg.report.evidence_limit, out)
}

pub async fn remediation(cfg: &AppConfig, document: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let pool = pipeline::open_database(cfg).await?;
    let report = pipeline::load_report(&pool, document, &[]).await?;
    if report.is_empty() {
        anyhow::bail!("no stored report for {document}");
    }
    write!(out, "{}", render_remediation(&remediation_view(&report)))?;
    Ok(())
}

pub async fn documents(cfg: &AppConfig, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let pool = pipeline::open_database(cfg).await?;
    let docs = storage::list_documents(&pool).await?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&docs)?)?;
    } else {
        write!(out, "{}", render_documents(&docs))?;
    }
    Ok(())
}

/// Drops every stored verdict for `document`.
pub async fn forget(cfg: &AppConfig, document: &str, out: &mut impl Write) -> anyhow::Result<u64> {
    let pool = pipeline::open_database(cfg).await?;
    let removed = storage::delete_document(&pool, document).await?;
    if removed == 0 {
        writeln!(out, "No stored report for {document}.")?;
    } else {
        info!(document, removed, "stored report deleted");
        writeln!(out, "{document}: removed {removed} verdicts")?;
    }
    Ok(removed)
}
