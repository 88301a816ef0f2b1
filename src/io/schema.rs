//! The COBRA JSON document layout, checked declaratively.
//!
//! Schemas are static trees. Every violation is reported with the path of
//! the offending value, in document order.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

/// A regular expression, compiled on first use.
///
/// Matching is an unanchored search, as in JSON Schema's `pattern`.
pub struct Pattern {
    source: &'static str,
    compiled: OnceLock<Result<Regex, regex::Error>>,
}

impl Pattern {
    /// Wrap a pattern for use in a static schema.
    pub const fn new(source: &'static str) -> Self {
        Self {
            source,
            compiled: OnceLock::new(),
        }
    }

    /// The pattern as shown in messages.
    pub fn source(&self) -> &'static str {
        self.source
    }

    /// The compiled expression.
    pub fn regex(&self) -> Result<&Regex, &regex::Error> {
        self.compiled.get_or_init(|| Regex::new(self.source)).as_ref()
    }

    /// Whether `text` contains a match. A pattern that fails to compile
    /// matches nothing.
    pub fn is_match(&self, text: &str) -> bool {
        match self.regex() {
            Ok(regex) => regex.is_match(text),
            Err(e) => {
                log::error!("schema pattern '{}' is invalid: {}", self.source, e);
                false
            }
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

/// A JSON object with known properties and no others.
#[derive(Debug)]
pub struct Record {
    /// Known properties and their schemas.
    pub properties: &'static [(&'static str, Schema)],
    /// Properties that must be present.
    pub required: &'static [&'static str],
}

/// A node of the schema tree.
#[derive(Debug)]
pub enum Schema {
    /// Any string.
    String,
    /// Any number.
    Number,
    /// An integral number.
    Integer,
    /// Any object.
    Object,
    /// A string matching a pattern.
    Matching(&'static Pattern),
    /// An array whose items all match.
    Array(&'static Schema),
    /// An object with arbitrary keys whose values all match.
    Values(&'static Schema),
    /// An object whose keys matching the pattern must have matching values.
    Keyed(&'static Pattern, &'static Schema),
    /// A closed object.
    Record(&'static Record),
}

impl Schema {
    fn type_name(&self) -> &'static str {
        match self {
            Schema::String | Schema::Matching(_) => "string",
            Schema::Number => "number",
            Schema::Integer => "integer",
            Schema::Array(_) => "array",
            Schema::Object | Schema::Values(_) | Schema::Keyed(..) | Schema::Record(_) => "object",
        }
    }

    fn accepts_type(&self, value: &Value) -> bool {
        match self {
            Schema::String | Schema::Matching(_) => value.is_string(),
            Schema::Number => value.is_number(),
            Schema::Integer => value.is_i64() || value.is_u64(),
            Schema::Array(_) => value.is_array(),
            Schema::Object | Schema::Values(_) | Schema::Keyed(..) | Schema::Record(_) => {
                value.is_object()
            }
        }
    }
}

// ============================================================================
// COBRA layout
// ============================================================================

static COMPARTMENT_ID: Pattern = Pattern::new("[a-z]{1,2}");
static VARIABLE_KIND: Pattern = Pattern::new("integer|continuous");
static CONSTRAINT_SENSE: Pattern = Pattern::new("E|L|G");

static NUMBER: Schema = Schema::Number;
static STRING: Schema = Schema::String;

static REACTION: Record = Record {
    properties: &[
        ("id", Schema::String),
        ("name", Schema::String),
        ("metabolites", Schema::Values(&NUMBER)),
        ("gene_reaction_rule", Schema::String),
        ("lower_bound", Schema::Number),
        ("upper_bound", Schema::Number),
        ("objective_coefficient", Schema::Number),
        ("variable_kind", Schema::Matching(&VARIABLE_KIND)),
        ("subsystem", Schema::String),
        ("notes", Schema::Object),
        ("annotation", Schema::Object),
    ],
    required: &[
        "id",
        "name",
        "metabolites",
        "lower_bound",
        "upper_bound",
        "gene_reaction_rule",
    ],
};

static METABOLITE: Record = Record {
    properties: &[
        ("id", Schema::String),
        ("name", Schema::String),
        ("compartment", Schema::Matching(&COMPARTMENT_ID)),
        ("charge", Schema::Integer),
        ("formula", Schema::String),
        ("_bound", Schema::Number),
        ("_constraint_sense", Schema::Matching(&CONSTRAINT_SENSE)),
        ("notes", Schema::Object),
        ("annotation", Schema::Object),
    ],
    required: &["id", "name", "compartment"],
};

static GENE: Record = Record {
    properties: &[
        ("id", Schema::String),
        ("name", Schema::String),
        ("notes", Schema::Object),
        ("annotation", Schema::Object),
    ],
    required: &["id", "name"],
};

static REACTION_ITEM: Schema = Schema::Record(&REACTION);
static METABOLITE_ITEM: Schema = Schema::Record(&METABOLITE);
static GENE_ITEM: Schema = Schema::Record(&GENE);

static MODEL: Record = Record {
    properties: &[
        ("id", Schema::String),
        ("name", Schema::String),
        ("description", Schema::String),
        ("version", Schema::Integer),
        ("reactions", Schema::Array(&REACTION_ITEM)),
        ("metabolites", Schema::Array(&METABOLITE_ITEM)),
        ("genes", Schema::Array(&GENE_ITEM)),
        ("compartments", Schema::Keyed(&COMPARTMENT_ID, &STRING)),
        ("notes", Schema::Object),
        ("annotation", Schema::Object),
    ],
    required: &["id", "reactions", "metabolites", "genes"],
};

/// Schema for a whole COBRA JSON model document.
pub static COBRA_MODEL: Schema = Schema::Record(&MODEL);

// ============================================================================
// Violations
// ============================================================================

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object member.
    Key(String),
    /// Array element.
    Index(usize),
}

/// A value that does not fit the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Location of the offending value; empty for the document root.
    pub path: Vec<PathSegment>,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str(&self.message);
        }
        f.write_str("Error in ")?;
        for (i, segment) in self.path.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
            }
        }
        write!(f, ": {}", self.message)
    }
}

/// Render a JSON value the way the messages quote it.
pub fn quote(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_str(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(quote).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote_str(k), quote(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn quote_str(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

/// Check a document against the COBRA model schema.
pub fn validate(document: &Value) -> Vec<SchemaViolation> {
    validate_against(&COBRA_MODEL, document)
}

/// Check a value against any schema.
pub fn validate_against(schema: &Schema, value: &Value) -> Vec<SchemaViolation> {
    let mut checker = Checker::default();
    checker.check(schema, value);
    checker.violations
}

#[derive(Default)]
struct Checker {
    path: Vec<PathSegment>,
    violations: Vec<SchemaViolation>,
}

impl Checker {
    fn report(&mut self, message: String) {
        self.violations.push(SchemaViolation {
            path: self.path.clone(),
            message,
        });
    }

    fn descend(&mut self, segment: PathSegment, schema: &Schema, value: &Value) {
        self.path.push(segment);
        self.check(schema, value);
        self.path.pop();
    }

    fn check(&mut self, schema: &Schema, value: &Value) {
        if !schema.accepts_type(value) {
            self.report(format!(
                "{} is not of type '{}'",
                quote(value),
                schema.type_name()
            ));
            return;
        }
        match (schema, value) {
            (Schema::Matching(pattern), Value::String(s)) if !pattern.is_match(s) => {
                self.report(format!("{} does not match '{}'", quote_str(s), pattern.source()));
            }
            (Schema::Array(items), Value::Array(values)) => {
                for (index, item) in values.iter().enumerate() {
                    self.descend(PathSegment::Index(index), items, item);
                }
            }
            (Schema::Values(inner), Value::Object(map)) => {
                for (key, item) in map {
                    self.descend(PathSegment::Key(key.clone()), inner, item);
                }
            }
            (Schema::Keyed(pattern, inner), Value::Object(map)) => {
                for (key, item) in map.iter().filter(|(k, _)| pattern.is_match(k)) {
                    self.descend(PathSegment::Key(key.clone()), inner, item);
                }
            }
            (Schema::Record(record), Value::Object(map)) => self.check_record(record, map),
            _ => {}
        }
    }

    fn check_record(&mut self, record: &Record, map: &Map<String, Value>) {
        for required in record.required {
            if !map.contains_key(*required) {
                self.report(format!("'{required}' is a required property"));
            }
        }

        let unexpected: Vec<String> = map
            .keys()
            .filter(|key| !record.properties.iter().any(|(name, _)| name == key))
            .map(|key| quote_str(key))
            .collect();
        match unexpected.len() {
            0 => {}
            1 => self.report(format!(
                "Additional properties are not allowed ({} was unexpected)",
                unexpected[0]
            )),
            _ => self.report(format!(
                "Additional properties are not allowed ({} were unexpected)",
                unexpected.join(", ")
            )),
        }

        for (key, item) in map {
            if let Some((_, schema)) = record.properties.iter().find(|(name, _)| name == key) {
                self.descend(PathSegment::Key(key.clone()), schema, item);
            }
        }
    }
}
