use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::shape::Shape;
use crate::span::Location;
use crate::value::Value;

/// Qualified path of a function inside its crate, without the `crate::` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub String);

impl FunctionId {
    pub fn new(module_path: &[String], self_ty: Option<&str>, name: &str) -> Self {
        let mut segments: Vec<&str> = module_path.iter().map(String::as_str).collect();
        if let Some(ty) = self_ty {
            segments.push(ty);
        }
        segments.push(name);
        FunctionId(segments.join("::"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier-safe spelling, used to name generated units.
    ///
    /// Segments are joined with `__`. When a segment could make that join
    /// ambiguous (it contains `__`, starts or ends with `_`, or is a raw
    /// identifier) the spelling ends in `___` and a digest of the full path.
    pub fn mangled(&self) -> String {
        let joined = self.0.replace("::", "__");
        if self.0.split("::").all(is_plain_segment) {
            joined
        } else {
            format!("{}___{}", joined, self.digest())
        }
    }

    /// Upper-case spelling for generated constant names. Paths whose case
    /// would be lost by upper-casing also carry the digest.
    pub fn constant_stem(&self) -> String {
        let mangled = self.mangled();
        let upper = mangled.to_uppercase();
        if mangled.chars().any(char::is_uppercase) {
            format!("{}___{}", upper, self.digest().to_uppercase())
        } else {
            upper
        }
    }

    /// First eight hex digits of the SHA-256 of the path.
    fn digest(&self) -> String {
        Sha256::digest(self.0.as_bytes())
            .iter()
            .take(4)
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.contains("__")
        && !segment.starts_with('_')
        && !segment.ends_with('_')
        && segment.chars().all(|c| c.is_alphanumeric() || c == '_')
}

impl Display for FunctionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Module,
    InherentImpl {
        /// Last path segment of the self type, used in paths.
        type_name: String,
        /// Self type as written, including generic arguments.
        self_ty: String,
        generics: String,
        where_clause: String,
    },
    TraitImpl {
        trait_path: String,
        self_ty: String,
    },
    Trait { name: String },
    /// A function nested in another function's body.
    Block,
}

impl Container {
    /// Only modules and inherent impls can receive generated items.
    pub fn is_extensible(&self) -> bool {
        matches!(self, Container::Module | Container::InherentImpl { .. })
    }

    /// Type segment inserted between the module path and the function name.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Container::InherentImpl { type_name, .. } => Some(type_name),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Container::Module => "a module".to_string(),
            Container::InherentImpl { self_ty, .. } => format!("`impl {}`", self_ty),
            Container::TraitImpl {
                trait_path,
                self_ty,
            } => format!("`impl {} for {}`", trait_path, self_ty),
            Container::Trait { name } => format!("trait `{}`", name),
            Container::Block => "a function body".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub pattern: String,
    pub ty: String,
}

/// Auxiliary inputs a compile-time function asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directives {
    /// Extra source files compiled into the evaluation image.
    pub files: Vec<String>,
    /// Extra `use` paths imported by the evaluation runner.
    pub uses: Vec<String>,
    /// Generator plugins run against the crate before evaluation.
    pub plugins: Vec<String>,
}

impl Directives {
    /// Append `other` after `self`, keeping order and duplicates.
    pub fn extend(&mut self, other: Directives) {
        self.files.extend(other.files);
        self.uses.extend(other.uses);
        self.plugins.extend(other.plugins);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.uses.is_empty() && self.plugins.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationFailure {
    NotExtensible { container: String },
    NotStatic,
    Async,
    MalformedDirective { attribute: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedFunction {
    pub id: FunctionId,
    pub name: String,
    pub location: Location,
    pub module_path: Vec<String>,
    pub container: Container,
    pub vis: String,
    /// Generic parameter list including angle brackets, or empty.
    pub generics: String,
    pub where_clause: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub failures: Vec<ValidationFailure>,
    pub directives: Directives,
}

impl AnnotatedFunction {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Path segments from the crate root to the function.
    pub fn call_path(&self) -> Vec<String> {
        let mut path = self.module_path.clone();
        if let Some(ty) = self.container.type_name() {
            path.push(ty.to_string());
        }
        path.push(self.name.clone());
        path
    }
}

/// Location-addressed token issued by the host for a single call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterceptToken {
    pub id: String,
    /// Source text of the binding marker attached to the redirection entry point.
    pub binding: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallSiteKind {
    Accepted {
        args: Vec<String>,
        token: InterceptToken,
    },
    Rejected {
        offending: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub function: FunctionId,
    pub location: Location,
    /// Module the call appears in, used to resolve constants in arguments.
    pub caller_module: Vec<String>,
    pub kind: CallSiteKind,
}

/// Separator used when joining argument texts into a group key.
const ARG_SEPARATOR: char = '\u{0}';
/// Ends the caller-module prefix of a group key.
const MODULE_SEPARATOR: char = '\u{1}';

impl CallSite {
    pub fn args(&self) -> Option<&[String]> {
        match &self.kind {
            CallSiteKind::Accepted { args, .. } => Some(args),
            CallSiteKind::Rejected { .. } => None,
        }
    }

    pub fn token(&self) -> Option<&InterceptToken> {
        match &self.kind {
            CallSiteKind::Accepted { token, .. } => Some(token),
            CallSiteKind::Rejected { .. } => None,
        }
    }

    pub fn offending(&self) -> Option<&str> {
        match &self.kind {
            CallSiteKind::Rejected { offending } => Some(offending),
            CallSiteKind::Accepted { .. } => None,
        }
    }

    /// Arguments that name anything (constants, paths, locals of the
    /// module) are keyed together with the caller's module, so the same text
    /// written in two modules is evaluated once per module.
    pub fn group_key(&self) -> Option<String> {
        self.args().map(|args| {
            let mut key = String::new();
            if args.iter().any(|arg| mentions_names(arg)) {
                key.push_str(&self.caller_module.join("::"));
                key.push(MODULE_SEPARATOR);
            }
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    key.push(ARG_SEPARATOR);
                }
                key.push_str(arg);
            }
            key
        })
    }
}

/// Whether argument text contains an identifier other than `true`/`false`,
/// looking past string, char and numeric literals.
fn mentions_names(arg: &str) -> bool {
    let mut chars = arg.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            '\'' => {
                // char literal; a lifetime or label is treated as a name
                match chars.next() {
                    Some('\\') => {
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\'' {
                                break;
                            }
                        }
                    }
                    Some(_) if chars.peek() == Some(&'\'') => {
                        chars.next();
                    }
                    _ => return true,
                }
            }
            c if c.is_ascii_digit() => {
                while chars
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || *c == '_')
                {
                    chars.next();
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&c) = chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                if word != "true" && word != "false" {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Outcome of analysing one invocation of a marked function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSiteOutcome {
    Site(CallSite),
    /// The host could not issue a token for this location.
    Skipped {
        function: FunctionId,
        location: Location,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentGroup {
    pub key: String,
    pub args: Vec<String>,
    pub sites: Vec<CallSite>,
}

impl ArgumentGroup {
    pub fn display_args(&self) -> String {
        self.args.join(", ")
    }

    /// Module arguments are evaluated in. Groups whose arguments mention names
    /// only hold sites from one module; literal-only groups may span modules.
    pub fn caller_module(&self) -> &[String] {
        self.sites
            .first()
            .map(|site| site.caller_module.as_slice())
            .unwrap_or(&[])
    }
}

/// Group accepted call sites by [`CallSite::group_key`], keeping the order in
/// which each distinct text first appears. Rejected sites are ignored.
pub fn group_call_sites(sites: impl IntoIterator<Item = CallSite>) -> Vec<ArgumentGroup> {
    let mut groups: Vec<ArgumentGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for site in sites {
        let Some(key) = site.group_key() else {
            continue;
        };
        match index.get(&key) {
            Some(&slot) => groups[slot].sites.push(site),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(ArgumentGroup {
                    key,
                    args: site.args().map(<[String]>::to_vec).unwrap_or_default(),
                    sites: vec![site],
                });
            }
        }
    }

    groups
}

/// A successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub value: Value,
    pub shape: Shape,
}

/// Rust expression text for a cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerializedLiteral(String);

impl SerializedLiteral {
    pub fn new(text: impl Into<String>) -> Self {
        SerializedLiteral(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for SerializedLiteral {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
