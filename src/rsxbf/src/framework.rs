
/// Lookup oracle for names the framework defines out-of-band.
///
/// XBF files reference well-known framework types, properties and enum
/// values by small integer ids (bit 15 set in the node stream) that are not
/// present in the file's own metadata tables. The tables mapping those ids
/// to names live outside this crate; the reader only needs these three
/// lookups.
pub trait Framework {
    fn type_name(&self, id: u16) -> Option<&str>;

    fn property_name(&self, id: u16) -> Option<&str>;

    fn enum_value(&self, enum_id: u16, value: i32) -> Option<String>;
}

/// Oracle that knows nothing. Every framework reference resolves to the
/// `UnknownType0x…` / `(Enum0x…)` placeholder forms.
pub struct NoFramework;

impl Framework for NoFramework {
    fn type_name(&self, _id: u16) -> Option<&str> {
        None
    }

    fn property_name(&self, _id: u16) -> Option<&str> {
        None
    }

    fn enum_value(&self, _enum_id: u16, _value: i32) -> Option<String> {
        None
    }
}
