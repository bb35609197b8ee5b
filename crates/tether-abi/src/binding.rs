//! Binding descriptor tables.
//!
//! A binding table maps the names exposed to host code onto real native
//! symbols and their signatures. Tables come either from typed Rust
//! construction or from a JSON document of the form
//!
//! ```json
//! {
//!   "foo": [["int32", "int32"], "float32"],
//!   "__init__": ["objconstructor", ["int32"], "ptr"]
//! }
//! ```
//!
//! where each descriptor is a `[params, return]` pair or a
//! `[real_symbol, params, return]` triple. Every entry is validated on
//! insertion, so a table that exists is a table the glue generator can render.

use std::collections::HashMap;
use std::fmt;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value as Json;

use crate::error::DescriptorError;
use crate::types::AbiType;

/// Prefix reserved for identifiers emitted by the glue generator.
pub const RESERVED_PREFIX: &str = "tether_";

/// Entry name used when the table document itself is malformed.
const TABLE_ENTRY: &str = "<table>";

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while",
];

/// Standard names the generated unit relies on through the ABI header.
const HEADER_NAMES: &[&str] = &["NULL", "int32_t", "int64_t", "intptr_t", "size_t", "uint32_t"];

/// One native symbol exposed under a host-visible name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingEntry {
    exposed_name: String,
    real_symbol: String,
    params: Vec<AbiType>,
    ret: AbiType,
}

impl BindingEntry {
    /// Bind `name` to the native symbol of the same name.
    pub fn new(name: impl Into<String>, params: impl Into<Vec<AbiType>>, ret: AbiType) -> Self {
        let exposed_name = name.into();
        BindingEntry {
            real_symbol: exposed_name.clone(),
            exposed_name,
            params: params.into(),
            ret,
        }
    }

    /// Call a differently named native symbol.
    pub fn with_symbol(mut self, real_symbol: impl Into<String>) -> Self {
        self.real_symbol = real_symbol.into();
        self
    }

    pub fn exposed_name(&self) -> &str {
        &self.exposed_name
    }

    pub fn real_symbol(&self) -> &str {
        &self.real_symbol
    }

    pub fn params(&self) -> &[AbiType] {
        &self.params
    }

    pub fn ret(&self) -> AbiType {
        self.ret
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Forward declaration of the real symbol, without the trailing `;`.
    pub fn declaration(&self) -> String {
        let params = if self.params.is_empty() {
            "void".to_owned()
        } else {
            self.params
                .iter()
                .map(|ty| ty.c_decl())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{}({})", declarator(self.ret, &self.real_symbol), params)
    }

    /// Check the entry in isolation.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        check_identifier(&self.exposed_name, &self.exposed_name, "exposed name")?;
        check_identifier(&self.exposed_name, &self.real_symbol, "native symbol")?;
        if let Some(index) = self.params.iter().position(|ty| ty.is_void()) {
            return Err(DescriptorError::new(
                &self.exposed_name,
                format!("parameter {index} has type `void`, which is only valid as a return type"),
            ));
        }
        Ok(())
    }

    fn same_signature(&self, other: &BindingEntry) -> bool {
        self.params == other.params && self.ret == other.ret
    }
}

impl fmt::Display for BindingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.exposed_name)?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ") -> {}", self.ret)?;
        if self.real_symbol != self.exposed_name {
            write!(f, " = {}", self.real_symbol)?;
        }
        Ok(())
    }
}

/// `char *name` rather than `char * name`.
fn declarator(ty: AbiType, name: &str) -> String {
    let decl = ty.c_decl();
    if decl.ends_with('*') {
        format!("{decl}{name}")
    } else {
        format!("{decl} {name}")
    }
}

fn check_identifier(entry: &str, ident: &str, what: &str) -> Result<(), DescriptorError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(DescriptorError::new(
            entry,
            format!("{what} `{ident}` is not a C identifier"),
        ));
    }
    if C_KEYWORDS.contains(&ident) {
        return Err(DescriptorError::new(
            entry,
            format!("{what} `{ident}` is a C keyword"),
        ));
    }
    if HEADER_NAMES.contains(&ident) {
        return Err(DescriptorError::new(
            entry,
            format!("{what} `{ident}` is defined by the ABI header"),
        ));
    }
    // Header macros are upper case, so the prefix is reserved in any case.
    if ident
        .get(..RESERVED_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(RESERVED_PREFIX))
    {
        return Err(DescriptorError::new(
            entry,
            format!("{what} `{ident}` uses the reserved `{RESERVED_PREFIX}` prefix"),
        ));
    }
    Ok(())
}

/// Ordered, validated map from exposed name to [`BindingEntry`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingTable {
    entries: Vec<BindingEntry>,
    index: HashMap<String, usize>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append an entry.
    pub fn insert(&mut self, entry: BindingEntry) -> Result<(), DescriptorError> {
        entry.validate()?;
        if self.index.contains_key(entry.exposed_name()) {
            return Err(DescriptorError::new(
                entry.exposed_name(),
                "name is bound more than once",
            ));
        }
        // Aliases of one symbol share a single forward declaration.
        if let Some(other) = self
            .entries
            .iter()
            .find(|e| e.real_symbol == entry.real_symbol && !e.same_signature(&entry))
        {
            return Err(DescriptorError::new(
                entry.exposed_name(),
                format!(
                    "native symbol `{}` is already bound by `{}` with signature `{}`",
                    entry.real_symbol,
                    other.exposed_name,
                    other.declaration()
                ),
            ));
        }
        self.index
            .insert(entry.exposed_name.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, entry: BindingEntry) -> Result<Self, DescriptorError> {
        self.insert(entry)?;
        Ok(self)
    }

    /// Build a table from untyped descriptors, preserving iteration order.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, DescriptorError>
    where
        I: IntoIterator<Item = (String, Json)>,
    {
        let mut table = BindingTable::new();
        for (name, descriptor) in descriptors {
            let entry = parse_descriptor(&name, &descriptor)?;
            table.insert(entry)?;
        }
        Ok(table)
    }

    /// Parse a JSON object of descriptors, preserving document order.
    pub fn from_json(text: &str) -> Result<Self, DescriptorError> {
        let OrderedDescriptors(descriptors) = serde_json::from_str(text)
            .map_err(|e| DescriptorError::new(TABLE_ENTRY, e.to_string()))?;
        Self::from_descriptors(descriptors)
    }

    pub fn get(&self, name: &str) -> Option<&BindingEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, BindingEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.exposed_name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a BindingTable {
    type Item = &'a BindingEntry;
    type IntoIter = std::slice::Iter<'a, BindingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Interpret one untyped descriptor.
pub fn parse_descriptor(name: &str, descriptor: &Json) -> Result<BindingEntry, DescriptorError> {
    let shape_error = || {
        DescriptorError::new(
            name,
            format!("expected [params, return] or [symbol, params, return], found {descriptor}"),
        )
    };
    let items = descriptor.as_array().ok_or_else(shape_error)?;
    let (symbol, params, ret) = match items.as_slice() {
        [params, ret] => (None, params, ret),
        [symbol, params, ret] => {
            let symbol = symbol.as_str().ok_or_else(|| {
                let reason = format!("native symbol must be a string, found {symbol}");
                DescriptorError::new(name, reason)
            })?;
            (Some(symbol), params, ret)
        }
        _ => return Err(shape_error()),
    };

    let params = params
        .as_array()
        .ok_or_else(|| {
            DescriptorError::new(name, format!("parameter list must be an array, found {params}"))
        })?
        .iter()
        .map(|p| parse_type(name, p))
        .collect::<Result<Vec<_>, _>>()?;
    let ret = parse_type(name, ret)?;

    let mut entry = BindingEntry::new(name, params, ret);
    if let Some(symbol) = symbol {
        entry = entry.with_symbol(symbol);
    }
    Ok(entry)
}

fn parse_type(entry: &str, value: &Json) -> Result<AbiType, DescriptorError> {
    let name = value.as_str().ok_or_else(|| {
        DescriptorError::new(entry, format!("type must be a string, found {value}"))
    })?;
    name.parse()
        .map_err(|e| DescriptorError::new(entry, format!("{e}")))
}

/// A JSON object read as an ordered list of entries.
struct OrderedDescriptors(Vec<(String, Json)>);

impl<'de> Deserialize<'de> for OrderedDescriptors {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedDescriptors;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping names to binding descriptors")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, descriptor)) = map.next_entry::<String, Json>()? {
                    entries.push((name, descriptor));
                }
                Ok(OrderedDescriptors(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}
