use std::process::exit;

fn fatal_line(msg: &str) -> String {
    format!("FATAL: {}", msg)
}

/// Reports `msg` once on stderr and exits; the log subscriber writes there too.
pub fn fatal(msg: &str) -> ! {
    eprintln!("{}", fatal_line(msg));
    exit(1);
}
