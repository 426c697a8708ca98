use ctfe_core::config::MarkerConfig;
use ctfe_core::model::Directives;
use syn::punctuated::Punctuated;
use syn::Token;

/// `#[comptime]` matches a configured `comptime` marker, and a configured
/// `ctfe::comptime` marker also matches a bare `#[comptime]`.
pub fn matches_marker(attr: &syn::Attribute, marker: &str) -> bool {
    let written: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect();
    let written = written.join("::");
    if written == marker {
        return true;
    }
    let last = marker.rsplit("::").next().unwrap_or(marker);
    written.rsplit("::").next() == Some(last)
}

pub fn has_marker(attrs: &[syn::Attribute], marker: &str) -> bool {
    attrs.iter().any(|attr| matches_marker(attr, marker))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveError {
    pub attribute: String,
    pub message: String,
}

/// Collect directive attributes in declaration order.
pub fn parse_directives(
    attrs: &[syn::Attribute],
    markers: &MarkerConfig,
) -> Result<Directives, DirectiveError> {
    let mut directives = Directives::default();
    for attr in attrs {
        let slot = if matches_marker(attr, &markers.files) {
            &mut directives.files
        } else if matches_marker(attr, &markers.uses) {
            &mut directives.uses
        } else if matches_marker(attr, &markers.plugins) {
            &mut directives.plugins
        } else {
            continue;
        };
        slot.extend(string_list(attr)?);
    }
    Ok(directives)
}

fn string_list(attr: &syn::Attribute) -> Result<Vec<String>, DirectiveError> {
    let error = |message: String| DirectiveError {
        attribute: attr
            .path()
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_default(),
        message,
    };
    match &attr.meta {
        syn::Meta::List(_) => attr
            .parse_args_with(Punctuated::<syn::LitStr, Token![,]>::parse_terminated)
            .map(|list| list.iter().map(syn::LitStr::value).collect())
            .map_err(|e| error(format!("expected a list of string literals: {}", e))),
        syn::Meta::NameValue(nv) => match &nv.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(s),
                ..
            }) => Ok(vec![s.value()]),
            _ => Err(error("expected a string literal".to_string())),
        },
        syn::Meta::Path(_) => Err(error("expected at least one argument".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn marker_matches_by_last_segment() {
        let bare: syn::Attribute = parse_quote!(#[comptime]);
        let qualified: syn::Attribute = parse_quote!(#[ctfe::comptime]);
        let other: syn::Attribute = parse_quote!(#[inline]);
        assert!(matches_marker(&bare, "comptime"));
        assert!(matches_marker(&qualified, "comptime"));
        assert!(matches_marker(&bare, "ctfe::comptime"));
        assert!(!matches_marker(&other, "comptime"));
    }

    #[test]
    fn directives_keep_declaration_order() {
        let attrs: Vec<syn::Attribute> = vec![
            parse_quote!(#[comptime_uses("std::collections::HashMap")]),
            parse_quote!(#[comptime_files("data/table.rs", "data/extra.rs")]),
            parse_quote!(#[comptime_uses = "crate::tables::*"]),
        ];
        let directives = parse_directives(&attrs, &MarkerConfig::default()).unwrap();
        assert_eq!(
            directives.uses,
            vec!["std::collections::HashMap", "crate::tables::*"]
        );
        assert_eq!(directives.files.len(), 2);
        assert!(directives.plugins.is_empty());
    }

    #[test]
    fn rejects_non_string_directives() {
        let attrs: Vec<syn::Attribute> = vec![parse_quote!(#[comptime_plugins(serde_gen)])];
        let error = parse_directives(&attrs, &MarkerConfig::default()).unwrap_err();
        assert_eq!(error.attribute, "comptime_plugins");
    }
}
