use env_logger::fmt::Formatter;
use log::{Record, Level};
use std::io::Write;
use chrono::Local;
use colored::*;

pub fn init_logger(log_level: &str) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    builder.format(format_log);

    // Filter out logs from actix_server and actix_web
    builder.filter(Some("actix_server"), log::LevelFilter::Warn);
    builder.filter(Some("actix_web"), log::LevelFilter::Warn);

    // A second init (tests, simulate after serve) is harmless.
    let _ = builder.try_init();
}

fn format_log(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let level_style = match record.level() {
        Level::Error => "ERROR".truecolor(255, 0, 0),
        Level::Warn => "WARN".truecolor(255, 165, 0),
        Level::Info => "INFO".truecolor(0, 255, 255),
        Level::Debug => "DEBUG".truecolor(138, 43, 226),
        Level::Trace => "TRACE".truecolor(255, 105, 180),
    };

    let message = format!(
        "{} [{}] - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        level_style,
        record.args()
    );

    writeln!(buf, "{}", message)
}

pub fn print_banner(host: &str, port: u16, auto_open: bool) {
    let teal = (0, 200, 180);
    let blue = (63, 156, 255);

    let border = "=".repeat(72);
    println!("{}", border.truecolor(blue.0, blue.1, blue.2));
    println!("{}", "    AI TOUR  ·  guided onboarding controller".truecolor(teal.0, teal.1, teal.2).bold());
    println!();
    println!("{}", format!("   - Address: http://{}:{}", host, port).cyan());
    println!("{}", format!("   - Tour socket: ws://{}:{}/tour/ws", host, port).cyan());
    if auto_open {
        println!("{}", "   - First-time viewers get the tour automatically".cyan());
    } else {
        println!("{}", "   - The tour only opens from \"Start tour\"".cyan());
    }
    println!("{}", border.truecolor(blue.0, blue.1, blue.2));
}
