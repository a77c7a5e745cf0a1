#![forbid(unsafe_code)]

use bl2_conformance::child::{CHILD_EXIT_USAGE, CHILD_SUBCOMMAND, ChildRequest, run_child};
use bl2_conformance::isolation::ProcessRunner;
use bl2_conformance::report::{build_report_artifact, run_all, write_conformance_report};
use bl2_conformance::{
    HarnessConfig, LIBRARY_ENV, OutcomeLog, fingerprint_library, parse_kind_list,
    parse_operation_list, parse_timeout_ms, parse_worker_count,
};
use std::io::{self, Write};
use std::path::PathBuf;

const USAGE: &str = "\
Usage: run_blas_l2_conformance [--library <path>] [--workers <n>] [--timeout-ms <ms>]
                               [--prefix <s,d,c,z>] [--test <gemv,gbmv,...>]
                               [--report-path <path>] [--log-path <path>]
                               [--no-color] [--allow-failures]
       run_blas_l2_conformance child <prefix> <test_name> <one|multi> [workers]";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some(CHILD_SUBCOMMAND) {
        std::process::exit(child_main(&args[1..]));
    }
    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("run_blas_l2_conformance failed: {err}");
            std::process::exit(2);
        }
    }
}

fn child_main(args: &[String]) -> i32 {
    let request = match ChildRequest::parse(args) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("run_blas_l2_conformance child: {err}");
            return CHILD_EXIT_USAGE;
        }
    };
    let Some(library_path) = std::env::var_os(LIBRARY_ENV).map(PathBuf::from) else {
        eprintln!("run_blas_l2_conformance child: {LIBRARY_ENV} is not set");
        return CHILD_EXIT_USAGE;
    };
    run_child(&request, &library_path, &mut io::stderr())
}

/// `None` when help was printed.
fn parse_args(args: &[String]) -> Result<Option<HarnessConfig>, String> {
    let mut config = HarnessConfig::from_env()?;
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--library" => config.library_path = Some(PathBuf::from(value("--library")?)),
            "--workers" => config.workers = parse_worker_count(&value("--workers")?)?,
            "--timeout-ms" => config.child_timeout = parse_timeout_ms(&value("--timeout-ms")?)?,
            "--prefix" => config.kinds = parse_kind_list(&value("--prefix")?)?,
            "--test" => config.operations = parse_operation_list(&value("--test")?)?,
            "--report-path" => config.report_path = Some(PathBuf::from(value("--report-path")?)),
            "--log-path" => config.log_path = Some(PathBuf::from(value("--log-path")?)),
            "--no-color" => config.color = false,
            "--allow-failures" => config.allow_failures = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(None);
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }
    Ok(Some(config))
}

fn run(args: &[String]) -> Result<i32, String> {
    let Some(config) = parse_args(args)? else {
        return Ok(0);
    };
    let library_path = config.library()?.to_path_buf();
    let library_sha256 = fingerprint_library(&library_path)?;
    // Opened before any child is spawned.
    let mut log = config
        .log_path
        .as_deref()
        .map(OutcomeLog::open)
        .transpose()?;

    let runner = ProcessRunner::current_exe(library_path.clone(), config.isolation_policy())?;
    println!(
        "BLAS Level-2 conformance: {} (sha256 {})",
        library_path.display(),
        &library_sha256[..12]
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let conformance = run_all(&config, &runner, log.as_mut(), &mut out)?;
    if let (Some(first), Some(log)) = (conformance.log_errors.first(), &log) {
        eprintln!(
            "run_blas_l2_conformance: {} of {} entries missing from {}; first error: {first}",
            conformance.log_errors.len(),
            conformance.records.len(),
            log.path().display()
        );
    }

    if let Some(report_path) = &config.report_path {
        let artifact = build_report_artifact(&config, &library_path, &library_sha256, &conformance);
        write_conformance_report(report_path, &artifact)?;
        writeln!(out, "wrote {}", report_path.display())
            .map_err(|err| format!("failed writing report: {err}"))?;
    }
    Ok(conformance.exit_code(config.allow_failures))
}
