
use std::collections::HashMap;

use super::*;

/// Resolves type, property and enum ids to display names.
///
/// Ids with bit 15 set refer to framework definitions and go through the
/// oracle; the rest index the in-file metadata tables. Table types are
/// qualified with the prefix declared for their `using:` namespace when the
/// root declared one.
pub(crate) struct NameResolver<'a> {
    metadata: &'a XbfMetadata,
    framework: &'a dyn Framework,
    /// Namespace URI to declared prefix, filled by root namespace opcodes.
    prefixes: HashMap<String, String>,
}

impl<'a> NameResolver<'a> {
    pub fn new(metadata: &'a XbfMetadata, framework: &'a dyn Framework) -> NameResolver<'a> {
        NameResolver {
            metadata,
            framework,
            prefixes: HashMap::new(),
        }
    }

    pub fn register_prefix(&mut self, uri: String, prefix: String) {
        self.prefixes.insert(uri, prefix);
    }

    pub fn string(&self, id: u16) -> Option<&str> {
        self.metadata.string(id as u32)
    }

    pub fn type_name(&self, id: u16) -> String {
        if id & 0x8000 != 0 {
            return match self.framework.type_name(id & 0x7FFF) {
                Some(name) => name.to_string(),
                None => format!("UnknownType0x{:04X}", id & 0x7FFF),
            };
        }

        let Some(row) = self.metadata.type_row(id) else {
            return format!("UnknownType0x{:04X}", id);
        };
        let name = self
            .metadata
            .string(row.name_id as u32)
            .unwrap_or_default()
            .to_string();

        // A type whose namespace was declared on the root element gets the
        // declared prefix; the default (empty) prefix leaves it bare.
        let namespace = self
            .metadata
            .type_namespaces
            .get(row.namespace_id as usize)
            .and_then(|ns| self.metadata.string(ns.name_id as u32));
        if let Some(namespace) = namespace {
            let uri = format!("using:{}", namespace);
            if let Some(prefix) = self.prefixes.get(&uri) {
                if !prefix.is_empty() {
                    return format!("{}:{}", prefix, name);
                }
            }
        }
        name
    }

    pub fn property_name(&self, id: u16) -> String {
        if id & 0x8000 != 0 {
            return match self.framework.property_name(id & 0x7FFF) {
                Some(name) => name.to_string(),
                None => format!("UnknownProperty0x{:04X}", id & 0x7FFF),
            };
        }

        match self.metadata.property_row(id) {
            Some(row) => self
                .metadata
                .string(row.name_id as u32)
                .unwrap_or_default()
                .to_string(),
            None => format!("UnknownProperty0x{:04X}", id),
        }
    }

    pub fn enum_value(&self, enum_id: u16, value: i32) -> String {
        self.framework
            .enum_value(enum_id & 0x7FFF, value)
            .unwrap_or_else(|| format!("(Enum0x{:04X}){}", enum_id & 0x7FFF, value))
    }
}
