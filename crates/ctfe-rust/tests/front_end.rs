use std::fs;

use eyre::Result;
use pretty_assertions::assert_eq;

use ctfe_core::config::MarkerConfig;
use ctfe_core::host::InterceptionHost;
use ctfe_core::model::{group_call_sites, CallSiteOutcome, InterceptToken};
use ctfe_core::span::Location;
use ctfe_rust::{discover_all, load_crate, CallSiteAnalyzer, ParsedCrate, SymbolIndex};

struct LineHost;

impl InterceptionHost for LineHost {
    fn intercept(&self, location: &Location) -> Option<InterceptToken> {
        (!location.in_macro).then(|| InterceptToken {
            id: location.to_string(),
            binding: format!("#[at({})]", location),
        })
    }
}

#[test]
fn test_multi_file_crate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("calendar").join("src");
    fs::create_dir_all(&src)?;
    fs::write(
        src.join("main.rs"),
        r#"mod tables;

use tables::Tables;

fn main() {
    let months = Tables::months();
    let again = tables::Tables::months();
    let days = tables::days_in(2);
    let leap = tables::days_in(1 + 1);
    let feb = tables::days_in(2);
    for m in 1..=12 {
        let _ = tables::days_in(m);
    }
    println!("{:?} {:?} {} {} {}", months, again, days, leap, feb);
}
"#,
    )?;
    fs::write(
        src.join("tables.rs"),
        r#"pub struct Tables;

impl Tables {
    #[comptime]
    pub fn months() -> Vec<&'static str> {
        vec!["Jan", "Feb"]
    }
}

#[comptime]
pub fn days_in(month: u32) -> u32 {
    if month == 2 { 28 } else { 31 }
}
"#,
    )?;

    let compilation = load_crate(&src.join("main.rs"), None)?;
    assert_eq!(compilation.crate_name, "calendar");
    let parsed = ParsedCrate::parse(&compilation)?;
    let functions = discover_all(&parsed, &MarkerConfig::default(), || false).unwrap();
    let ids: Vec<_> = functions.iter().map(|f| f.id.to_string()).collect();
    assert_eq!(ids, vec!["tables::Tables::months", "tables::days_in"]);

    let index = SymbolIndex::build(&parsed);
    let host = LineHost;
    let analyzer = CallSiteAnalyzer::new(&index, &functions, &host);
    let outcomes = analyzer.analyze(&parsed, || false).unwrap();

    let sites: Vec<_> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            CallSiteOutcome::Site(site) => Some(site),
            CallSiteOutcome::Skipped { .. } => None,
        })
        .collect();
    assert_eq!(sites.len(), 6);
    assert_eq!(sites[5].offending(), Some("m"));

    let days: Vec<_> = sites
        .iter()
        .filter(|site| site.function.as_str() == "tables::days_in")
        .cloned()
        .collect();
    let groups = group_call_sites(days);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].args, vec!["2".to_string()]);
    assert_eq!(groups[0].sites.len(), 2);
    assert_eq!(groups[1].args, vec!["1 + 1".to_string()]);
    Ok(())
}

#[test]
fn test_cancellation_stops_discovery() -> Result<()> {
    let compilation = ctfe_core::Compilation::new("demo").with_unit(ctfe_core::SourceUnit::root(
        "src/lib.rs",
        "#[comptime] fn a() -> u8 { 1 }\n#[comptime] fn b() -> u8 { 2 }\n",
    ));
    let parsed = ParsedCrate::parse(&compilation)?;
    assert!(discover_all(&parsed, &MarkerConfig::default(), || true).is_none());
    Ok(())
}
