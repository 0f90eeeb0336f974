use kiln::{
    ast::tree,
    cache::LoweringCache,
    cli::{Args, EmitKind},
    lower_module,
    profile::Profiler,
    LowerDiagnostic, LowerError,
};

use kiln_sourcemap::{diag, SourceMap};
use kiln_ssa::{binary, Module};

use anyhow::{Context, Result};

use std::io::Write;

fn main() {
    let args = Args::from_cli();
    args.logger().parse_default_env().init();

    let mut profiler = Profiler::new(args.profile);
    let result = try_main(&args, &mut profiler);
    if let Err(e) = profiler.report(&mut std::io::stderr()) {
        eprintln!("failed to write the profile report: {}", e);
    }
    if let Err(e) = result {
        eprintln!("error: {:?}", e);
        std::process::exit(1);
    }
}

fn try_main(args: &Args, profiler: &mut Profiler) -> Result<()> {
    let (name, ast) = profiler
        .time("Load", || tree::load_file(&args.path))
        .with_context(|| format!("failed to load {}", args.path.display()))?;

    let file = match &args.source {
        Some(source) => SourceMap::new(source)
            .with_context(|| format!("failed to read source file {}", source.display()))?,
        None => SourceMap::from_source(&args.path, String::new()),
    };

    let cache = match &args.cache {
        Some(path) if path.exists() => match LoweringCache::load(path) {
            Ok(cache) => cache,
            Err(e) => {
                log::debug!("ignoring cache {}: {}", path.display(), e);
                LoweringCache::new()
            }
        },
        _ => LoweringCache::new(),
    };

    let options = args.lower_options();
    let mut diagnostics: Vec<LowerDiagnostic> = Vec::new();
    let lowered = profiler.time("Lower", || {
        let mut lower = || lower_module(&ast, &name, &options, Some(&cache), &mut diagnostics);
        match args.jobs {
            Some(jobs) if options.parallel => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map(|pool| pool.install(lower))
                .context("failed to start the worker threads"),
            _ => Ok(lower()),
        }
    })?;

    let mut stderr = std::io::stderr().lock();
    let module = match lowered {
        Ok(module) => module,
        Err(e) => {
            // Internal errors are reported on their own.
            if matches!(e, LowerError::Aborted { .. }) {
                diag::report_batch(&file, &mut stderr, &diagnostics)?;
            }
            e.to_diagnostic().report(&file, &mut stderr)?;
            anyhow::bail!("exiting due to lowering errors");
        }
    };
    if !diagnostics.is_empty() {
        diag::report_batch(&file, &mut stderr, &diagnostics)?;
        anyhow::bail!("exiting due to {} lowering errors", diagnostics.len());
    }

    let stats = cache.stats();
    log::debug!(
        "cache: {} hits, {} misses, {} entries",
        stats.hits,
        stats.misses,
        stats.entries
    );
    if let Some(path) = &args.cache {
        profiler
            .time("Cache Save", || cache.save(path))
            .with_context(|| format!("failed to write cache {}", path.display()))?;
    }

    profiler.time("Emit", || emit(args, &module))
}

fn emit(args: &Args, module: &Module) -> Result<()> {
    let bytes = match args.emit {
        EmitKind::Nothing => return Ok(()),
        EmitKind::Text => module.to_string().into_bytes(),
        EmitKind::Binary => binary::encode(module),
    };
    match &args.output {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("failed to write {}", path.display())),
        None => std::io::stdout()
            .lock()
            .write_all(&bytes)
            .context("failed to write to standard output"),
    }
}
