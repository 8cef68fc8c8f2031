// GAUNTLET ENVIRONMENT CHECK
// EMULATION TOOLS, SCHEME WRAPPERS, PROFILE TRACES, AND WHETHER THE KERNEL
// CAN PROVIDE EACH SCHEME'S CONGESTION CONTROL. EXIT 1 ON ANY HARD FAILURE.

use std::io::Read;
use std::process::Command;

use anyhow::Result;

use gauntlet::config::Config;

const AVAILABLE_CC: &str = "/proc/sys/net/ipv4/tcp_available_congestion_control";

#[derive(Debug, PartialEq)]
enum CcStatus {
    Loaded,
    Module,
    Builtin,
    NotSet,
    Unknown,
}

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn read_kernel_config() -> Option<String> {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (KERNEL CONFIG SKIPPED)");
            return None;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (KERNEL CONFIG SKIPPED)");
        return None;
    }
    Some(config)
}

// A SCHEME IS BACKED BY THE KERNEL WHEN ITS NAME IS A tcp_cong MODULE.
// USER-SPACE SCHEMES SHOW UP AS Unknown AND ARE NOT A FAILURE.
fn kernel_cc_status(name: &str, available: &str, config: Option<&str>) -> CcStatus {
    if available.split_whitespace().any(|cc| cc == name) {
        return CcStatus::Loaded;
    }
    let Some(config) = config else {
        return CcStatus::Unknown;
    };
    let key = format!("CONFIG_TCP_CONG_{}", name.to_ascii_uppercase());
    let unset = format!("# {} is not set", key);
    for line in config.lines() {
        if line == unset {
            return CcStatus::NotSet;
        }
        match line.strip_prefix(key.as_str()) {
            Some("=m") => return CcStatus::Module,
            Some("=y") => return CcStatus::Builtin,
            _ => {}
        }
    }
    CcStatus::Unknown
}

pub fn run_check(config: &Config) -> Result<()> {
    println!("GAUNTLET ENVIRONMENT CHECK");
    println!();

    let mut ok = true;

    println!("TOOLS:");
    let mut tools = vec!["mm-delay", "mm-link"];
    if let Some(interp) = config.interpreter.as_deref() {
        tools.push(interp);
    }
    for tool in &tools {
        if check_tool(tool) {
            println!("  {:<24}OK", tool);
        } else {
            println!("  {:<24}MISSING", tool);
            ok = false;
        }
    }
    println!();

    println!("SCHEMES ({}):", config.wrappers_path().display());
    for name in &config.schemes {
        let scheme = config.resolve_scheme(name);
        if scheme.entry().is_file() {
            println!("  {:<24}OK", name);
        } else {
            println!("  {:<24}MISSING ({})", name, scheme.entry().display());
            ok = false;
        }
    }
    println!();

    println!("PROFILES:");
    for (id, profile) in &config.profiles {
        let traces = [&profile.downlink, &profile.uplink];
        let missing: Vec<_> = traces
            .iter()
            .map(|t| config.base_dir.join(t))
            .filter(|p| !p.is_file())
            .collect();
        if missing.is_empty() {
            println!("  {:<24}OK ({}MS)", id, profile.delay);
        } else {
            for p in &missing {
                println!("  {:<24}TRACE MISSING ({})", id, p.display());
            }
            ok = false;
        }
    }
    println!();

    println!("KERNEL CONGESTION CONTROL:");
    let available = std::fs::read_to_string(AVAILABLE_CC).unwrap_or_default();
    let kconfig = read_kernel_config();
    for name in &config.schemes {
        match kernel_cc_status(name, &available, kconfig.as_deref()) {
            CcStatus::Loaded => println!("  {:<24}AVAILABLE", name),
            CcStatus::Builtin => println!("  {:<24}BUILT IN", name),
            CcStatus::Module => println!("  {:<24}MODULE (modprobe tcp_{})", name, name),
            CcStatus::Unknown => println!("  {:<24}NOT A KERNEL CC (USER SPACE)", name),
            CcStatus::NotSet => {
                println!("  {:<24}DISABLED IN KERNEL CONFIG", name);
                ok = false;
            }
        }
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        if !check_tool("mm-delay") || !check_tool("mm-link") {
            println!("  Install mahimahi: apt install mahimahi");
        }
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KCONFIG: &str = "\
CONFIG_TCP_CONG_CUBIC=y
CONFIG_TCP_CONG_BBR=m
# CONFIG_TCP_CONG_VEGAS is not set
CONFIG_TCP_CONG_ADVANCED=y
";

    #[test]
    fn loaded_wins_over_config() {
        assert_eq!(kernel_cc_status("vegas", "reno cubic vegas", Some(KCONFIG)), CcStatus::Loaded);
    }

    #[test]
    fn config_lookup() {
        assert_eq!(kernel_cc_status("cubic", "reno", Some(KCONFIG)), CcStatus::Builtin);
        assert_eq!(kernel_cc_status("bbr", "reno", Some(KCONFIG)), CcStatus::Module);
        assert_eq!(kernel_cc_status("vegas", "reno", Some(KCONFIG)), CcStatus::NotSet);
        assert_eq!(kernel_cc_status("copa", "reno", Some(KCONFIG)), CcStatus::Unknown);
    }

    #[test]
    fn no_config_is_unknown() {
        assert_eq!(kernel_cc_status("bbr", "reno cubic", None), CcStatus::Unknown);
    }
}
