// GAUNTLET BATCH ENTRY POINT
// --all OR --schemes "A B C" (MUTUALLY EXCLUSIVE, ONE REQUIRED).
// EXIT 0 ONLY WHEN EVERY TRIAL RAN TO ITS TIME LIMIT.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};

use gauntlet::config::{parse_scheme_list, Config};
use gauntlet::driver::Driver;
use gauntlet::error::ConfigError;
use gauntlet::port::PortAllocator;
use gauntlet::scheme::Scheme;
use gauntlet::sweep::Sweep;

#[derive(Args)]
#[command(group(ArgGroup::new("selection").required(true).args(["all", "schemes"])))]
pub struct RunArgs {
    // TEST EVERY SCHEME LISTED IN THE CONFIG
    #[arg(long)]
    all: bool,

    // TEST A SPACE-SEPARATED LIST OF SCHEMES
    #[arg(long, value_name = "\"SCHEME1 SCHEME2...\"")]
    schemes: Option<String>,

    // RESTRICT TO A SPACE-SEPARATED LIST OF PROFILE IDS
    #[arg(long, value_name = "\"PROFILE1 PROFILE2...\"")]
    profiles: Option<String>,

    // OVERRIDE THE PER-TRIAL BUDGET IN SECONDS
    #[arg(long)]
    duration: Option<u64>,
}

pub fn run_batch(config: &Config, args: &RunArgs) -> Result<()> {
    // MALFORMED SELECTIONS FAIL HERE, BEFORE ANYTHING IS SPAWNED
    let names = if args.all {
        if config.schemes.is_empty() {
            bail!(ConfigError::EmptySchemeList);
        }
        config.schemes.clone()
    } else {
        parse_scheme_list(args.schemes.as_deref().unwrap_or(""))?
    };
    let profiles = config.select_profiles(args.profiles.as_deref())?;

    let mut settings = config.trial_settings();
    if let Some(secs) = args.duration {
        settings.duration = Duration::from_secs(secs);
    }

    let schemes: Vec<Scheme> = names.iter().map(|n| config.resolve_scheme(n)).collect();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .context("installing interrupt handler")?;

    println!("GAUNTLET v{}", env!("CARGO_PKG_VERSION"));
    println!("SCHEMES:   {}", names.join(" "));
    println!("PROFILES:  {}", profiles.join(" "));
    println!(
        "BUDGET:    {}s PER TRIAL (GRACE {:.1}s, SAMPLE EVERY {:.1}s)",
        settings.duration.as_secs(),
        settings.grace.as_secs_f64(),
        settings.sample_interval.as_secs_f64()
    );
    println!("WRAPPERS:  {}", config.wrappers_path().display());
    println!("LOGS:      {}", settings.log_dir.display());

    // RENDEZVOUS PORTS ARE PROBED ON THE PEER ADDRESS WHEN IT IS AN IP
    let bind: IpAddr = settings
        .peer_addr
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let sweep = Sweep::new(&config.base_dir, &config.wrappers_path(), config.sweep_tool_path());
    let mut driver = Driver::new(settings, PortAllocator::new(bind))
        .with_sweep(sweep)
        .with_shutdown(shutdown);

    let report = driver.run(&schemes, &profiles);
    report.print_summary();

    if report.passed() {
        println!("PASSED ALL TESTS!");
        return Ok(());
    }

    eprintln!(
        "gauntlet: {} of {} trials failed{}",
        report.failures(),
        report.trials.len(),
        if report.interrupted { " (batch interrupted)" } else { "" }
    );
    std::process::exit(1);
}
