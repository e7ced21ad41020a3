//! tinit - minimal process-1 supervisor
//!
//! Multi-call binary. Under its own name it runs the supervision loop;
//! under the applet names (`reboot`, `poweroff`, `halt`, `re-exec`,
//! `spawn`, `respawn`, `zombize`) it signals or delegates to the running
//! instance. The canonical binary also accepts an applet invocation as
//! its arguments, so symlinks are a convenience rather than a
//! requirement.

use std::path::Path;

use clap::Parser;

use tinit::applet;
use tinit::supervisor::{self, Supervisor};

#[derive(Parser)]
#[command(name = "tinit")]
#[command(version)]
#[command(about = "Minimal process-1 supervisor for embedded Linux")]
struct Args {
    /// Ask the running supervisor to re-execute itself
    #[arg(long)]
    re_exec: bool,

    /// Applet name and arguments (e.g. `reboot`, `spawn CMD...`)
    #[arg(trailing_var_arg = true)]
    applet: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().collect();
    let name = invoked_name(&argv);

    // symlinked applet names bypass option parsing entirely
    if name != "tinit" {
        run_applet(&name, argv.get(1..).unwrap_or_default());
    }

    let args = Args::parse();

    if args.re_exec && !supervisor::is_pid1() {
        // not the supervisor itself: forward to the real process 1
        run_applet("re-exec", &[]);
    }

    if let Some((applet_name, rest)) = args.applet.split_first() {
        run_applet(applet_name, rest);
    }

    match Supervisor::new(argv).run() {
        Ok(never) => match never {},
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run_applet(name: &str, args: &[String]) -> ! {
    match applet::dispatch(name, args) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn invoked_name(argv: &[String]) -> String {
    argv.first()
        .map(Path::new)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tinit".to_string())
}
