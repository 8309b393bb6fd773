// Tagged console logging. The teacher carries no logging framework — just
// colored, tagged println!/eprintln! lines — so floatchain does the same.

use colored::*;

pub fn info(tag: &str, msg: impl AsRef<str>) {
    println!("{} {}", format!("[{tag}]").cyan().bold(), msg.as_ref());
}

pub fn warn(tag: &str, msg: impl AsRef<str>) {
    println!("{} {}", format!("[{tag}]").yellow().bold(), msg.as_ref());
}

pub fn error(tag: &str, msg: impl AsRef<str>) {
    eprintln!("{} {}", format!("[{tag}]").red().bold(), msg.as_ref());
}
