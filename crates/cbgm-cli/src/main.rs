//! cbgm: command-line tools over the CBGM genealogical cache.
//!
//! Thin shells over `cbgm-core` and `cbgm-cache`:
//! - `build-cache` ingests a collation document and persists the cache;
//! - the table commands (`compare-witnesses`, `enumerate-relationships`,
//!   `find-relatives`, `optimize-substemmata`) read the cache and print
//!   fixed/csv/tsv/json tables;
//! - the `print-*` commands emit Graphviz DOT files.
//!
//! Exit codes: 0 on success, 1 on user errors (missing file, unknown
//! witness or unit, invalid flag), -1 on internal errors.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cbgm_cache::Cache;
use cbgm_core::{
    compare_rank, Apparatus, CollationDoc, GlobalStemma, IngestOptions, SearchLimits,
    SetCoverProblem, TextualFlow, Witness, UNLIMITED_CONNECTIVITY,
};

mod dot;
mod tables;

use tables::{format_cost, format_percent, Table, TableFormat};

// ============================================================================
// Error classification
// ============================================================================

/// A mistake in the invocation or its inputs, as opposed to an internal
/// failure; mapped to exit code 1.
#[derive(Debug)]
struct UserError(String);

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UserError {}

fn user_error(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UserError(msg.into()))
}

// ============================================================================
// CLI definition
// ============================================================================

#[derive(Parser)]
#[command(name = "cbgm")]
#[command(version, about = "Coherence-Based Genealogical Method toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a collation document and build the genealogical cache.
    BuildCache {
        /// Collation document (JSON).
        input: PathBuf,
        /// Output cache file; an existing file is overwritten.
        output: PathBuf,
        /// Minimum extant readings threshold for keeping a witness.
        #[arg(short = 't', long)]
        threshold: Option<usize>,
        /// Reading type to treat as trivial (repeatable).
        #[arg(short = 'z', long = "trivial")]
        trivial: Vec<String>,
        /// Reading type to drop entirely (repeatable).
        #[arg(short = 'Z', long = "dropped")]
        dropped: Vec<String>,
        /// Witness siglum suffix to ignore (repeatable).
        #[arg(short = 's', long = "suffix")]
        suffixes: Vec<String>,
        /// Merge split attestations of the same reading.
        #[arg(long)]
        merge_splits: bool,
        /// Use classic CBGM rules for explained readings and costs.
        #[arg(long)]
        classic: bool,
    },

    /// Print a witness's genealogical comparisons with other witnesses.
    CompareWitnesses {
        /// Genealogical cache file.
        cache: PathBuf,
        /// Primary witness ID.
        witness: String,
        /// Secondary witness IDs; all other witnesses when omitted.
        secondaries: Vec<String>,
        /// Witness IDs to exclude (ignored when secondaries are given).
        #[arg(short = 'e', long = "exclude")]
        excluded: Vec<String>,
        /// Minimum proportion of extant units for inclusion (0..1; ignored
        /// when secondaries are given).
        #[arg(short = 'p', long)]
        proportion_extant: Option<f64>,
        #[arg(short = 'f', long, default_value = "fixed")]
        format: String,
        /// Output file; stdout when omitted.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// List variation units by genealogical relationship for a witness pair.
    EnumerateRelationships {
        cache: PathBuf,
        primary: String,
        secondary: String,
        /// Relationship filter: extant, agree, prior, posterior, norel,
        /// unclear, explained (repeatable; all when omitted).
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(short = 'f', long, default_value = "fixed")]
        format: String,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Print the relatives of a witness at one variation unit.
    FindRelatives {
        cache: PathBuf,
        witness: String,
        /// Variation unit ID.
        unit: String,
        /// Restrict to relatives supporting these readings (repeatable).
        #[arg(short = 'r', long = "reading")]
        readings: Vec<String>,
        #[arg(short = 'f', long, default_value = "fixed")]
        format: String,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Search for minimum-cost substemmata of a witness.
    OptimizeSubstemmata {
        cache: PathBuf,
        witness: String,
        /// Fixed upper bound on substemma cost; enumerates all substemmata
        /// within it.
        #[arg(short = 'b', long)]
        bound: Option<f64>,
        /// Witness IDs to exclude as potential ancestors.
        #[arg(short = 'e', long = "exclude")]
        excluded: Vec<String>,
        /// Minimum proportion of extant units for potential ancestors.
        #[arg(short = 'p', long)]
        proportion_extant: Option<f64>,
        /// Time budget in seconds; on expiry the best solutions found so
        /// far are printed with a warning.
        #[arg(long)]
        timeout: Option<f64>,
        #[arg(short = 'f', long, default_value = "fixed")]
        format: String,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Write local-stemma DOT files.
    PrintLocalStemma {
        cache: PathBuf,
        /// Variation unit IDs; all units when omitted.
        units: Vec<String>,
        /// Base directory for the `local/` output directory.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Write textual-flow DOT files (complete flow, coherence in
    /// attestations, coherence at variant passages).
    PrintTextualFlow {
        cache: PathBuf,
        /// Variation unit IDs; all units when omitted.
        units: Vec<String>,
        /// Print complete textual flow diagrams.
        #[arg(long)]
        flow: bool,
        /// Print coherence-in-attestations diagrams.
        #[arg(long)]
        attestations: bool,
        /// Print coherence-at-variant-passages diagrams.
        #[arg(long)]
        variants: bool,
        /// Format edges to reflect flow strengths.
        #[arg(long)]
        strengths: bool,
        /// Connectivity limit override.
        #[arg(short = 'k', long)]
        connectivity: Option<u32>,
        /// Base directory for the output directories.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Optimize all substemmata and write the global stemma DOT file.
    PrintGlobalStemma {
        cache: PathBuf,
        /// Print genealogical costs as edge lengths.
        #[arg(long)]
        lengths: bool,
        /// Format edges to reflect flow strengths.
        #[arg(long)]
        strengths: bool,
        /// Witness IDs to exclude from the global stemma.
        #[arg(short = 'e', long = "exclude")]
        excluded: Vec<String>,
        /// Minimum proportion of extant units for inclusion.
        #[arg(short = 'p', long)]
        proportion_extant: Option<f64>,
        /// Per-witness optimizer time budget in seconds.
        #[arg(long)]
        timeout: Option<f64>,
        /// Base directory for the `global/` output directory.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(cli.command) {
        if e.downcast_ref::<UserError>().is_some() {
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(1);
        }
        eprintln!("{} {e:#}", "internal error:".red().bold());
        std::process::exit(-1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::BuildCache {
            input,
            output,
            threshold,
            trivial,
            dropped,
            suffixes,
            merge_splits,
            classic,
        } => build_cache(
            &input,
            &output,
            IngestOptions {
                trivial_reading_types: trivial.into_iter().collect(),
                dropped_reading_types: dropped.into_iter().collect(),
                ignored_suffixes: suffixes,
                merge_splits,
                threshold: threshold.unwrap_or(0),
                classic,
            },
        ),
        Commands::CompareWitnesses {
            cache,
            witness,
            secondaries,
            excluded,
            proportion_extant,
            format,
            output,
        } => compare_witnesses_cmd(
            &cache,
            &witness,
            &secondaries,
            &excluded,
            proportion_extant,
            &format,
            output.as_deref(),
        ),
        Commands::EnumerateRelationships {
            cache,
            primary,
            secondary,
            filters,
            format,
            output,
        } => enumerate_relationships_cmd(
            &cache,
            &primary,
            &secondary,
            &filters,
            &format,
            output.as_deref(),
        ),
        Commands::FindRelatives {
            cache,
            witness,
            unit,
            readings,
            format,
            output,
        } => find_relatives_cmd(&cache, &witness, &unit, &readings, &format, output.as_deref()),
        Commands::OptimizeSubstemmata {
            cache,
            witness,
            bound,
            excluded,
            proportion_extant,
            timeout,
            format,
            output,
        } => optimize_substemmata_cmd(
            &cache,
            &witness,
            bound,
            &excluded,
            proportion_extant,
            timeout,
            &format,
            output.as_deref(),
        ),
        Commands::PrintLocalStemma { cache, units, dir } => {
            print_local_stemma_cmd(&cache, &units, &dir)
        }
        Commands::PrintTextualFlow {
            cache,
            units,
            flow,
            attestations,
            variants,
            strengths,
            connectivity,
            dir,
        } => print_textual_flow_cmd(
            &cache,
            &units,
            flow,
            attestations,
            variants,
            strengths,
            connectivity,
            &dir,
        ),
        Commands::PrintGlobalStemma {
            cache,
            lengths,
            strengths,
            excluded,
            proportion_extant,
            timeout,
            dir,
        } => print_global_stemma_cmd(
            &cache,
            lengths,
            strengths,
            excluded,
            proportion_extant,
            timeout,
            &dir,
        ),
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn open_cache(path: &Path) -> Result<Cache> {
    if !path.exists() {
        return Err(user_error(format!("cache file {} does not exist", path.display())));
    }
    println!("{}", "Opening cache...".dimmed());
    Cache::open(path)
}

fn require_witness(cache: &Cache, id: &str) -> Result<()> {
    if !cache.witness_exists(id) {
        return Err(user_error(format!("unknown witness `{id}`")));
    }
    Ok(())
}

/// Resolve `-e`/`-p` into one exclusion list.
fn resolve_exclusions(
    cache: &Cache,
    excluded: &[String],
    proportion_extant: Option<f64>,
) -> Result<Vec<String>> {
    let mut out: Vec<String> = excluded.to_vec();
    if let Some(p) = proportion_extant {
        if !(0.0..=1.0).contains(&p) {
            return Err(user_error(format!(
                "proportion of extant variation units {p} is not between 0 and 1"
            )));
        }
        let min_extant = (p * cache.unit_ids().len() as f64).ceil() as u64;
        for wit in cache.fragmentary_witnesses(min_extant)? {
            if !out.contains(&wit) {
                out.push(wit);
            }
        }
    }
    Ok(out)
}

fn write_table(table: &Table, format: &str, output: Option<&Path>) -> Result<()> {
    let format = TableFormat::parse(format).map_err(|e| user_error(e.to_string()))?;
    match output {
        None => table.write(format, &mut std::io::stdout().lock()),
        Some(path) => {
            let mut file = fs::File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            table.write(format, &mut file)
        }
    }
}

fn write_dot(dir: &Path, name: &str, contents: &str) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    let path = dir.join(name);
    let mut file = fs::File::create(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// The shared statistics columns of the comparison and relatives tables.
fn comparison_cells(witness: &Witness, comp: &cbgm_core::GenealogicalComparison) -> Vec<String> {
    vec![
        witness
            .ancestor_rank(&comp.secondary)
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string()),
        format_percent(comp.agreement_ratio()),
        comp.agreements.len().to_string(),
        comp.extant.len().to_string(),
        comp.prior.len().to_string(),
        comp.posterior.len().to_string(),
        comp.norel.len().to_string(),
        comp.unclear.len().to_string(),
        format_cost(comp.cost),
    ]
}

// ============================================================================
// Commands
// ============================================================================

fn build_cache(input: &Path, output: &Path, options: IngestOptions) -> Result<()> {
    if !input.exists() {
        return Err(user_error(format!(
            "collation file {} does not exist",
            input.display()
        )));
    }
    println!("{}", "Parsing collation document...".dimmed());
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let doc: CollationDoc = serde_json::from_str(&text)
        .map_err(|e| user_error(format!("malformed collation document: {e}")))?;

    println!("{}", "Building apparatus...".dimmed());
    let app = Apparatus::from_collation(&doc, &options)
        .map_err(|e| user_error(format!("invalid collation: {e:#}")))?;

    println!(
        "{}",
        "Initializing all witnesses (this may take a while)...".dimmed()
    );
    let started = Instant::now();
    let witnesses = cbgm_core::initialize_witnesses(&app)?;
    println!(
        "Calculated coherence for {} witnesses in {:.2?}.",
        witnesses.len(),
        started.elapsed()
    );

    println!("{}", "Writing cache...".dimmed());
    let cache = Cache::build(&app, &witnesses, &options)?;
    cache.write_to(output)?;
    println!("{} {}", "Wrote".green(), output.display());
    Ok(())
}

fn compare_witnesses_cmd(
    cache_path: &Path,
    witness_id: &str,
    secondaries: &[String],
    excluded: &[String],
    proportion_extant: Option<f64>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let cache = open_cache(cache_path)?;
    require_witness(&cache, witness_id)?;
    for s in secondaries {
        require_witness(&cache, s)?;
    }

    // Explicit secondaries override the exclusion options.
    let excluded = if secondaries.is_empty() {
        resolve_exclusions(&cache, excluded, proportion_extant)?
    } else {
        Vec::new()
    };
    let witness = cache.load_witness(witness_id, &excluded)?;

    let mut comps: Vec<&cbgm_core::GenealogicalComparison> = witness
        .comparisons()
        .iter()
        .filter(|c| c.secondary != witness_id)
        .filter(|c| secondaries.is_empty() || secondaries.contains(&c.secondary))
        .collect();
    comps.sort_by(|a, b| compare_rank(b, a));

    let mut table = Table::new(&[
        "SECONDARY_WIT",
        "NR",
        "PERC",
        "EQ",
        "PASS",
        "PRIOR",
        "POSTERIOR",
        "NOREL",
        "UNCLEAR",
        "COST",
    ]);
    for comp in comps {
        let mut row = vec![comp.secondary.clone()];
        row.extend(comparison_cells(&witness, comp));
        table.push_row(row);
    }
    write_table(&table, format, output)
}

fn enumerate_relationships_cmd(
    cache_path: &Path,
    primary: &str,
    secondary: &str,
    filters: &[String],
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    const RELATIONSHIPS: [&str; 7] = [
        "extant",
        "agree",
        "prior",
        "posterior",
        "norel",
        "unclear",
        "explained",
    ];
    let selected: Vec<String> = if filters.is_empty() {
        RELATIONSHIPS.iter().map(|r| r.to_string()).collect()
    } else {
        for f in filters {
            if !RELATIONSHIPS.contains(&f.as_str()) {
                return Err(user_error(format!(
                    "unknown relationship `{f}` (expected one of {})",
                    RELATIONSHIPS.join(", ")
                )));
            }
        }
        filters.to_vec()
    };

    let cache = open_cache(cache_path)?;
    require_witness(&cache, primary)?;
    require_witness(&cache, secondary)?;
    let witness = cache.load_witness(primary, &[])?;
    let comp = witness
        .comparison_for(secondary)
        .ok_or_else(|| user_error(format!("no comparison of `{primary}` with `{secondary}`")))?;
    let labels = cache.unit_labels();

    let mut table = Table::new(&["PASSAGE", "RELATIONSHIP"]);
    for name in &selected {
        let bits = match name.as_str() {
            "extant" => &comp.extant,
            "agree" => &comp.agreements,
            "prior" => &comp.prior,
            "posterior" => &comp.posterior,
            "norel" => &comp.norel,
            "unclear" => &comp.unclear,
            "explained" => &comp.explained,
            _ => unreachable!(),
        };
        for i in bits.iter() {
            let label = labels
                .get(i as usize)
                .copied()
                .ok_or_else(|| anyhow!("bitmap index {i} out of range of the unit table"))?;
            table.push_row(vec![label.to_string(), name.clone()]);
        }
    }
    write_table(&table, format, output)
}

fn find_relatives_cmd(
    cache_path: &Path,
    witness_id: &str,
    unit_id: &str,
    readings: &[String],
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let cache = open_cache(cache_path)?;
    require_witness(&cache, witness_id)?;
    if !cache.unit_exists(unit_id) {
        return Err(user_error(format!("unknown variation unit `{unit_id}`")));
    }
    let unit = cache.load_variation_unit(unit_id)?;
    for r in readings {
        if !unit.readings().iter().any(|u| u == r) {
            return Err(user_error(format!(
                "variation unit {unit_id} has no reading `{r}`"
            )));
        }
    }
    let witness = cache.load_witness(witness_id, &[])?;

    let mut comps: Vec<&cbgm_core::GenealogicalComparison> = witness
        .comparisons()
        .iter()
        .filter(|c| c.secondary != witness_id)
        .filter(|c| unit.reading_for(&c.secondary).is_some())
        .filter(|c| {
            readings.is_empty()
                || readings
                    .iter()
                    .any(|r| unit.reading_for(&c.secondary) == Some(r.as_str()))
        })
        .collect();
    comps.sort_by(|a, b| compare_rank(b, a));

    let mut table = Table::new(&[
        "WITNESS",
        "RDG",
        "NR",
        "PERC",
        "EQ",
        "PASS",
        "PRIOR",
        "POSTERIOR",
        "NOREL",
        "UNCLEAR",
        "COST",
    ]);
    for comp in comps {
        let rdg = unit
            .reading_for(&comp.secondary)
            .expect("relatives are extant at the unit");
        let mut row = vec![comp.secondary.clone(), rdg.to_string()];
        row.extend(comparison_cells(&witness, comp));
        table.push_row(row);
    }
    write_table(&table, format, output)
}

fn optimize_substemmata_cmd(
    cache_path: &Path,
    witness_id: &str,
    bound: Option<f64>,
    excluded: &[String],
    proportion_extant: Option<f64>,
    timeout: Option<f64>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    if let Some(b) = bound {
        if b <= 0.0 {
            return Err(user_error(format!("cost bound {b} must be positive")));
        }
    }
    let cache = open_cache(cache_path)?;
    require_witness(&cache, witness_id)?;
    let excluded = resolve_exclusions(&cache, excluded, proportion_extant)?;
    let witness = cache.load_witness(witness_id, &excluded)?;

    if witness.potential_ancestor_ids().is_empty() {
        println!(
            "The witness with ID {witness_id} has no potential ancestors. This may be because \
             it is too fragmentary or because it has equal priority to the initial text \
             according to local stemmata."
        );
        return Ok(());
    }

    match bound {
        Some(b) => println!(
            "Finding all substemmata for witness {witness_id} with costs within {b}..."
        ),
        None => println!("Finding minimum-cost substemmata for witness {witness_id}..."),
    }
    let problem = SetCoverProblem::for_witness(&witness);
    let limits = SearchLimits {
        deadline: timeout.map(|t| Instant::now() + Duration::from_secs_f64(t)),
        cancel: None,
    };
    let result = problem.solve(bound, &limits);

    if result.possibly_suboptimal {
        eprintln!(
            "{}",
            "warning: time budget exhausted; results may be suboptimal".yellow()
        );
    }
    if !result.uncovered.is_empty() {
        let labels = cache.unit_labels();
        let names: Vec<&str> = result
            .uncovered
            .iter()
            .filter_map(|i| labels.get(i as usize).copied())
            .collect();
        println!(
            "The witness with ID {witness_id} cannot be explained by any of its potential \
             ancestors at the following variation units: {}",
            names.join(", ")
        );
        return Ok(());
    }
    if result.solutions.is_empty() {
        if let Some(b) = bound {
            println!(
                "No substemma exists with a cost below {b}; try again with a higher bound or \
                 without specifying a fixed upper bound."
            );
        }
        return Ok(());
    }

    let mut table = Table::new(&["SUBSTEMMA", "COST", "COVERED"]);
    for sol in &result.solutions {
        table.push_row(vec![
            sol.rows.join(", "),
            format_cost(sol.cost),
            sol.covered.len().to_string(),
        ]);
    }
    write_table(&table, format, output)
}

fn require_units(cache: &Cache, unit_ids: &[String]) -> Result<()> {
    for id in unit_ids {
        if !cache.unit_exists(id) {
            return Err(user_error(format!("unknown variation unit `{id}`")));
        }
    }
    Ok(())
}

fn print_local_stemma_cmd(cache_path: &Path, unit_ids: &[String], dir: &Path) -> Result<()> {
    let cache = open_cache(cache_path)?;
    require_units(&cache, unit_ids)?;
    let units = cache.load_variation_units(unit_ids)?;
    let out_dir = dir.join("local");
    for unit in &units {
        let dot = dot::render_local_stemma(unit.local_stemma());
        write_dot(&out_dir, &format!("{}-local-stemma.dot", unit.id()), &dot)?;
    }
    println!(
        "{} {} local stemma file(s) under {}",
        "Wrote".green(),
        units.len(),
        out_dir.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn print_textual_flow_cmd(
    cache_path: &Path,
    unit_ids: &[String],
    flow: bool,
    attestations: bool,
    variants: bool,
    strengths: bool,
    connectivity: Option<u32>,
    dir: &Path,
) -> Result<()> {
    if connectivity == Some(0) {
        return Err(user_error("connectivity (-k) must be a positive integer"));
    }
    // With no graph type selected, print all of them.
    let (flow, attestations, variants) = if flow || attestations || variants {
        (flow, attestations, variants)
    } else {
        (true, true, true)
    };

    let cache = open_cache(cache_path)?;
    require_units(&cache, unit_ids)?;
    let units = cache.load_variation_units(unit_ids)?;
    if let Some(k) = connectivity {
        println!("Using connectivity limit {}.", connectivity_label(k));
    }
    println!("{}", "Initializing all witnesses...".dimmed());
    let witnesses = cache.load_all_witnesses(&[])?;

    println!("{}", "Generating textual flow diagrams...".dimmed());
    let mut written = 0usize;
    for unit in &units {
        let graph = TextualFlow::build(unit, &witnesses, connectivity);
        let readings: Vec<&str> = unit.readings().iter().map(String::as_str).collect();
        if flow {
            let out = dot::render_textual_flow(&graph, &readings, strengths);
            write_dot(
                &dir.join("flow"),
                &format!("{}-textual-flow.dot", unit.id()),
                &out,
            )?;
            written += 1;
        }
        if attestations {
            for reading in &readings {
                let out =
                    dot::render_coherence_in_attestation(&graph, reading, &readings, strengths);
                write_dot(
                    &dir.join("attestations"),
                    &format!("{}R{}-coherence-attestations.dot", unit.id(), reading),
                    &out,
                )?;
                written += 1;
            }
        }
        if variants {
            let out = dot::render_coherence_at_variants(&graph, &readings, strengths);
            write_dot(
                &dir.join("variants"),
                &format!("{}-coherence-variants.dot", unit.id()),
                &out,
            )?;
            written += 1;
        }
    }
    println!("{} {written} DOT file(s) under {}", "Wrote".green(), dir.display());
    Ok(())
}

fn print_global_stemma_cmd(
    cache_path: &Path,
    lengths: bool,
    strengths: bool,
    excluded: Vec<String>,
    proportion_extant: Option<f64>,
    timeout: Option<f64>,
    dir: &Path,
) -> Result<()> {
    let cache = open_cache(cache_path)?;
    let excluded = resolve_exclusions(&cache, &excluded, proportion_extant)?;
    println!("{}", "Initializing all witnesses...".dimmed());
    let mut witnesses = cache.load_all_witnesses(&excluded)?;

    println!(
        "{}",
        "Optimizing substemmata (this may take a moment)...".dimmed()
    );
    let started = Instant::now();
    let stemma = GlobalStemma::build(
        &mut witnesses,
        timeout.map(Duration::from_secs_f64),
    )?;
    println!("Finished optimizing substemmata in {:.2?}.", started.elapsed());
    for wit in &stemma.possibly_suboptimal {
        eprintln!(
            "{}",
            format!("warning: substemma search for {wit} hit its time budget").yellow()
        );
    }

    let out = dot::render_global_stemma(&stemma, lengths, strengths);
    let out_dir = dir.join("global");
    write_dot(&out_dir, "global-stemma.dot", &out)?;
    println!(
        "{} {}",
        "Wrote".green(),
        out_dir.join("global-stemma.dot").display()
    );
    Ok(())
}

fn connectivity_label(connectivity: u32) -> String {
    if connectivity == UNLIMITED_CONNECTIVITY {
        "unlimited".to_string()
    } else {
        connectivity.to_string()
    }
}
