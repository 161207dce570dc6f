use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use wtemplate::cli::Args;

fn make_args(args: &[&str]) -> Vec<OsString> {
    let mut res = vec![OsString::from("wtemplate")];
    res.extend(args.iter().map(OsString::from));
    res
}

#[test]
fn test_basic_args() {
    let args = make_args(&["./page.html"]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.template, PathBuf::from("./page.html"));
    assert_eq!(parsed.vars, None);
    assert_eq!(parsed.output, None);
    assert!(!parsed.stdin);
    assert!(!parsed.verbose);
}

#[test]
fn test_all_flags() {
    let args = make_args(&[
        "--vars",
        "vars.yml",
        "--output",
        "out.html",
        "--config",
        "wtemplate.json",
        "--stdin",
        "--verbose",
        "./page.html",
    ]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.vars, Some(PathBuf::from("vars.yml")));
    assert_eq!(parsed.output, Some(PathBuf::from("out.html")));
    assert_eq!(parsed.config, Some(PathBuf::from("wtemplate.json")));
    assert!(parsed.stdin);
    assert!(parsed.verbose);
}

#[test]
fn test_short_flags() {
    let args = make_args(&["-s", "-v", "-o", "out.html", "./page.html"]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert!(parsed.stdin);
    assert!(parsed.verbose);
    assert_eq!(parsed.output, Some(PathBuf::from("out.html")));
}

#[test]
fn test_missing_args() {
    let args = make_args(&[]);
    assert!(Args::try_parse_from(args).is_err());
}

#[test]
fn test_too_many_args() {
    let args = make_args(&["./page.html", "extra"]);
    assert!(Args::try_parse_from(args).is_err());
}
