//! CLI output styling for execlone

use colored::Colorize;
use execlone::{CloneReport, SealReport, SupportInfo};

/// Print the banner line
pub fn print_banner(silent: bool) {
    if silent {
        return;
    }

    let title = "execlone".truecolor(204, 102, 0).bold();
    let ver = format!("v{}", env!("CARGO_PKG_VERSION")).white();
    eprintln!("{} {}", title, ver);
    eprintln!();
}

fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "yes".green()
    } else {
        "no".red()
    }
}

fn seal_list(seals: &[String]) -> String {
    if seals.is_empty() {
        "none".to_string()
    } else {
        seals.join(", ")
    }
}

/// Print a clone verification report
pub fn print_clone_report(report: &CloneReport) {
    println!("{}", "Source:".white().bold());
    println!("  path:   {}", report.source.display().to_string().white());
    println!("  size:   {} bytes", report.source_size);
    println!("  mode:   {:04o}", report.source_mode);
    println!("  sha256: {}", report.source_sha256.truecolor(150, 150, 150));

    println!("{}", "Clone:".white().bold());
    println!("  reference: {}", report.reference.display().to_string().white());
    println!("  size:      {} bytes", report.clone_size);
    println!("  mode:      {:04o}", report.clone_mode);
    println!("  sha256:    {}", report.clone_sha256.truecolor(150, 150, 150));
    println!("  seals:     {}", seal_list(&report.seals));

    if report.verified {
        println!("{}", "Clone is byte-identical and sealed.".green());
    } else {
        println!("{}", "Clone verification FAILED.".red().bold());
    }
}

/// Print the seal state of a file
pub fn print_seal_report(report: &SealReport) {
    println!("{}", report.path.display().to_string().white().bold());
    println!("  type:      {}", report.kind);
    println!("  size:      {} bytes", report.size);
    println!("  mode:      {:04o}", report.mode);
    println!("  sealable:  {}", yes_no(report.sealable));
    println!("  seals:     {}", seal_list(&report.seals));
    println!("  immutable: {}", yes_no(report.immutable));
}

/// Print the platform support check
pub fn print_support(info: &SupportInfo) {
    let status = if info.is_supported {
        "supported".green()
    } else {
        "unsupported".red()
    };
    println!("{}: {}", info.platform, status);
    println!("  {}", info.details.truecolor(150, 150, 150));
}
