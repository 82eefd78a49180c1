
use paste::paste;

/// # Node stream opcodes
///
/// Each node is a one-byte opcode followed by an opcode-specific payload.
/// Several opcodes are overloaded on interpreter context: 0x12 declares a
/// namespace in a root frame but starts a nested root inside a node frame,
/// and 0x04 dispatches on the live stack state. The table therefore only
/// maps bytes to names; the interpreter decides what a byte means where.
///
/// The mnemonics are the vocabulary the disassembly uses.
macro_rules! opcodes {
    ($(OPDEF($name:ident, $mnemonic:tt, $byte:tt))*) => {
        paste! {
            opcodes!(@def $([<$name:camel>], $mnemonic, $byte)*);
        }
    };

    (@def $($name:ident, $mnemonic:tt, $byte:tt)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            pub fn from_u8(byte: u8) -> Option<Opcode> {
                match byte {
                    $($byte => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            pub fn byte(&self) -> u8 {
                match self {
                    $(Opcode::$name => $byte,)*
                }
            }

            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes!(
    OPDEF(UNKNOWN_PROLOGUE, "prologue", 0x01)
    OPDEF(COLLECTION_END, "collectionend", 0x02)
    OPDEF(ROOT_NAMESPACE_EX, "namespace", 0x03)
    OPDEF(VERBATIM, "verbatim", 0x04)
    OPDEF(SET_PROPERTY, "setproperty", 0x07)
    OPDEF(ADD_OBJ, "addobj", 0x08)
    OPDEF(ADD_OBJ_STYLE, "addobj", 0x09)
    OPDEF(KEY_ADD_OBJ, "keyaddobj", 0x0A)
    OPDEF(CLASS, "class", 0x0B)
    OPDEF(CONNECTION, "connection", 0x0C)
    OPDEF(NAME, "name", 0x0D)
    OPDEF(UID, "uid", 0x0E)
    OPDEF(REF_SECTION, "refsection", 0x0F)
    OPDEF(DATA_TEMPLATE, "datatemplate", 0x11)
    OPDEF(ROOT_NAMESPACE, "namespace", 0x12)
    OPDEF(COLLECTION_BEGIN, "collectionbegin", 0x13)
    OPDEF(OBJ_BEGIN, "objbegin", 0x14)
    OPDEF(LITERAL, "literal", 0x15)
    OPDEF(LITERAL_EX, "literal", 0x16)
    OPDEF(ROOT_BEGIN, "rootbegin", 0x17)
    OPDEF(CREATE_TYPE, "createtype", 0x18)
    OPDEF(CREATE_TYPE_EX, "createtype", 0x19)
    OPDEF(PROPERTY, "property", 0x1A)
    OPDEF(PROPERTY_EX, "property", 0x1B)
    OPDEF(RESOLVED_PROPERTY, "resolvedproperty", 0x1C)
    OPDEF(STYLE_TARGET_TYPE, "targettype", 0x1D)
    OPDEF(STATIC_RESOURCE, "staticresource", 0x1E)
    OPDEF(TEMPLATE_BINDING, "templatebinding", 0x1F)
    OPDEF(SET_PROPERTY_EXTENSION, "setproperty", 0x20)
    OPDEF(OBJ_END, "objend", 0x21)
    OPDEF(STATIC_RESOURCE_OBJ, "staticresourceobj", 0x22)
    OPDEF(THEME_RESOURCE_OBJ, "themeresourceobj", 0x23)
    OPDEF(THEME_RESOURCE, "themeresource", 0x24)
    OPDEF(COND_BEGIN, "condbegin", 0x26)
    OPDEF(COND_END, "condend", 0x27)
    OPDEF(OBJ_END_RETURN, "objend-return", 0x28)
    OPDEF(UNKNOWN_POP, "unknownpop", 0x8B)
);
