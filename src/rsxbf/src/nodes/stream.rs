
use super::*;

/// Sentinel end bound for single-object/single-node reads, which terminate
/// on an opcode instead of a section boundary.
const UNBOUNDED: u64 = u64::MAX;

/// Records a disassembly command for the opcode dispatched at `$start`.
/// Without an active trace this is free apart from the branch.
macro_rules! record {
    ($self:ident, $start:expr, $($fmt:tt)*) => {
        if $self.trace.is_some() {
            let text = format!($($fmt)*);
            $self.record($start, text);
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    /// Run until the end bound or a returning opcode.
    Nodes,
    /// Run until the first object begun in this frame is closed.
    SingleObject,
    /// Dispatch exactly one opcode.
    SingleNode,
}

struct Trace {
    commands: Vec<Command>,
    indent: usize,
    section: usize,
}

/// # Node stream interpreter
///
/// Walks the opcode stream of a node section and materializes the object
/// graph. Three stacks carry the interpreter state:
///
/// * `root_stack` holds the open root objects; nested roots are legal.
/// * `obj_stack` holds the open objects; the top is the target of property
///   and child opcodes, and closed objects linger on top until a consumer
///   (`setproperty`, `addobj`, `keyaddobj`) pops them.
/// * `col_stack` holds the open collections; the top receives added objects
///   and is either the top object's implicit children collection or an
///   explicit collection opened by `collectionbegin`.
///
/// Styles, resource dictionaries, templates, deferred elements and visual
/// states live in sibling node sections reached through intra-file offsets.
/// Descending into one saves the read position, seeks, interprets, and
/// restores the position on the way out, on every exit path.
pub(crate) struct NodeReader<'a> {
    buffer: &'a mut Buffer,
    metadata: &'a XbfMetadata,
    names: NameResolver<'a>,
    graph: XamlGraph,
    root_stack: Vec<ObjectId>,
    obj_stack: Vec<ObjectId>,
    col_stack: Vec<CollectionId>,
    trace: Option<Trace>,
    depth: usize,
    depth_limit: usize,
    /// Position of the opcode byte dispatched last, for error reporting.
    last_dispatch: u64,
}

impl<'a> NodeReader<'a> {
    pub fn new(
        buffer: &'a mut Buffer,
        metadata: &'a XbfMetadata,
        framework: &'a dyn Framework,
        depth_limit: usize,
        tracing: bool,
    ) -> NodeReader<'a> {
        NodeReader {
            buffer,
            names: NameResolver::new(metadata, framework),
            metadata,
            graph: XamlGraph::new(),
            root_stack: Vec::new(),
            obj_stack: Vec::new(),
            col_stack: Vec::new(),
            trace: tracing.then(|| Trace {
                commands: Vec::new(),
                indent: 0,
                section: 0,
            }),
            depth: 0,
            depth_limit,
            last_dispatch: 0,
        }
    }

    pub fn last_dispatch(&self) -> u64 {
        self.last_dispatch
    }

    /// Parses node section 0 as the document root.
    pub fn read_root_section(&mut self) -> Result<ObjectId> {
        let (start, end) = match self.metadata.node_section(0) {
            Some(section) => self.bounds(section, self.metadata.node_section_base)?,
            // No directory entry; whatever follows the directory is the
            // stream, bounded by the file itself.
            None => (
                self.metadata.node_section_base,
                self.buffer.get_ref().len() as u64,
            ),
        };
        self.buffer.set_position(start);
        let root = self.read_root(end)?;
        if self.obj_stack.len() != 1 || !self.col_stack.is_empty() {
            return Err(XbfError::StackCorruption);
        }
        Ok(root)
    }

    /// Interprets an arbitrary node section, for disassembly.
    pub fn read_section(&mut self, index: usize) -> Result<()> {
        let (start, end) = self.section(index, self.buffer.position())?;
        if let Some(trace) = self.trace.as_mut() {
            trace.section = index;
        }
        self.buffer.set_position(start);
        self.read_nodes(end, ReadMode::Nodes)
    }

    pub fn into_graph(self) -> XamlGraph {
        self.graph
    }

    pub fn into_disassembly(self) -> Disassembly {
        Disassembly {
            commands: self.trace.map(|trace| trace.commands).unwrap_or_default(),
        }
    }

    /// # Root frame
    ///
    /// | Opcode     | Meaning |
    /// | ---------- | ------- |
    /// | 0x12, 0x03 | namespace declaration: u16 XML namespace id, inline prefix string |
    /// | 0x0B       | `x:Class`: inline string |
    /// | 0x17       | root begin: u16 type id, then the node frame |
    fn read_root(&mut self, end: u64) -> Result<ObjectId> {
        let root = self.graph.new_object(String::new());
        self.root_stack.push(root);
        self.obj_stack.push(root);

        loop {
            let start = self.buffer.position();
            self.last_dispatch = start;
            let byte = self.buffer.read_u8()?;
            let op = Opcode::from_u8(byte).ok_or(XbfError::UnknownOpcode {
                opcode: byte,
                position: start,
            })?;
            match op {
                Opcode::RootNamespace | Opcode::RootNamespaceEx => {
                    let ns_position = self.buffer.position();
                    let ns_id = self.buffer.read_u16::<LittleEndian>()?;
                    let uri = self
                        .metadata
                        .xml_namespace(ns_id)
                        .ok_or(XbfError::UnexpectedByte { position: ns_position })?
                        .to_string();
                    let prefix = self.buffer.read_len_string()?;
                    self.names.register_prefix(uri.clone(), prefix.clone());
                    let attribute = if prefix.is_empty() {
                        "xmlns".to_string()
                    } else {
                        format!("xmlns:{}", prefix)
                    };
                    record!(self, start, "namespace {}=\"{}\"", attribute, uri);
                    self.graph
                        .object_mut(root)
                        .properties
                        .push((attribute, PropertyValue::Value(Value::Str(uri))));
                }
                Opcode::Class => {
                    let class = self.buffer.read_len_string()?;
                    record!(self, start, "class {}", class);
                    self.graph
                        .object_mut(root)
                        .properties
                        .push(("x:Class".to_string(), PropertyValue::Value(Value::Str(class))));
                }
                Opcode::RootBegin => {
                    let type_name = self.read_type_name()?;
                    record!(self, start, "rootbegin {}", type_name);
                    self.indent(1);
                    self.graph.object_mut(root).type_name = type_name;
                    let children = self.graph.object(root).children;
                    self.col_stack.push(children);
                    self.read_nodes(end, ReadMode::Nodes)?;
                    break;
                }
                _ => {
                    return Err(XbfError::UnknownOpcode {
                        opcode: byte,
                        position: start,
                    })
                }
            }
        }

        self.root_stack.pop();
        Ok(root)
    }

    /// # Node frame
    ///
    /// Dispatches opcodes until the end bound, or until an opcode returns
    /// out of the frame: `objend` for the current root or the single object
    /// being read, `objend-return` unconditionally.
    fn read_nodes(&mut self, end: u64, mode: ReadMode) -> Result<()> {
        let mut single_object: Option<ObjectId> = None;

        while self.buffer.position() < end {
            let start = self.buffer.position();
            self.last_dispatch = start;
            let byte = self.buffer.read_u8()?;
            let op = Opcode::from_u8(byte).ok_or(XbfError::UnknownOpcode {
                opcode: byte,
                position: start,
            })?;

            match op {
                // Shows up at the start of some secondary sections.
                Opcode::UnknownPrologue => {
                    record!(self, start, "prologue");
                }

                Opcode::Verbatim => self.read_verbatim(start)?,

                Opcode::SetProperty | Opcode::SetPropertyExtension => {
                    let name = self.read_property_name()?;
                    let value = self.pop_object()?;
                    record!(self, start, "setproperty {}", name);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name, PropertyValue::Object(value)));
                }

                Opcode::AddObj | Opcode::AddObjStyle => {
                    let value = self.pop_object()?;
                    record!(self, start, "addobj {}", self.graph.object(value).type_name);
                    let collection = self.current_collection()?;
                    self.graph.collection_mut(collection).items.push(value);
                }

                Opcode::KeyAddObj => {
                    let value = self.pop_object()?;
                    let key = self.read_value()?;
                    record!(self, start, "keyaddobj \"{}\"", key);
                    self.graph.object_mut(value).key = Some(key.to_string());
                    let collection = self.current_collection()?;
                    self.graph.collection_mut(collection).items.push(value);
                }

                Opcode::Class => {
                    let class = self.buffer.read_len_string()?;
                    record!(self, start, "class {}", class);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push(("x:Class".to_string(), PropertyValue::Value(Value::Str(class))));
                }

                Opcode::Connection => {
                    let value = self.read_value()?;
                    let Value::Int(id) = value else {
                        return Err(XbfError::UnexpectedByte { position: start });
                    };
                    record!(self, start, "connection {}", id);
                    let current = self.current()?;
                    self.graph.object_mut(current).connection_id = Some(id);
                }

                Opcode::Name => {
                    let value = self.read_value()?;
                    record!(self, start, "name {}", value);
                    let current = self.current()?;
                    self.graph.object_mut(current).name = Some(value.to_string());
                }

                Opcode::Uid => {
                    let value = self.read_value()?;
                    record!(self, start, "uid {}", value);
                    let current = self.current()?;
                    self.graph.object_mut(current).uid = Some(value.to_string());
                }

                Opcode::RefSection => self.read_section_reference(start)?,

                Opcode::DataTemplate => self.read_data_template(start)?,

                Opcode::CollectionBegin => {
                    let name = self.read_property_name()?;
                    let current = self.current()?;
                    let collection = self.graph.new_collection(current, name.clone());
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name.clone(), PropertyValue::Collection(collection)));
                    self.col_stack.push(collection);
                    record!(self, start, "collectionbegin {}", name);
                    self.indent(1);
                }

                Opcode::CollectionEnd => {
                    if self.col_stack.pop().is_none() {
                        return Err(XbfError::StackCorruption);
                    }
                    self.indent(-1);
                    record!(self, start, "collectionend");
                }

                Opcode::ObjBegin => {
                    let type_name = self.read_type_name()?;
                    let object = self.graph.new_object(type_name.clone());
                    self.obj_stack.push(object);
                    let children = self.graph.object(object).children;
                    self.col_stack.push(children);
                    if mode == ReadMode::SingleObject && single_object.is_none() {
                        single_object = Some(object);
                    }
                    record!(self, start, "objbegin {}", type_name);
                    self.indent(1);
                }

                Opcode::ObjEnd => {
                    let current = self.current()?;
                    if self.col_stack.last() == Some(&self.graph.object(current).children) {
                        self.col_stack.pop();
                    }
                    self.indent(-1);
                    record!(self, start, "objend");
                    if mode == ReadMode::SingleObject && single_object == Some(current) {
                        return Ok(());
                    }
                    if self.root_stack.last() == Some(&current) {
                        return Ok(());
                    }
                }

                Opcode::ObjEndReturn => {
                    let current = self.current()?;
                    if self.col_stack.last() == Some(&self.graph.object(current).children) {
                        self.col_stack.pop();
                    }
                    self.indent(-1);
                    record!(self, start, "objend-return");
                    return Ok(());
                }

                Opcode::Literal | Opcode::LiteralEx => {
                    let type_name = self.read_type_name()?;
                    let value = self.read_value()?;
                    record!(self, start, "literal {} = \"{}\"", type_name, value);
                    let object = self.graph.new_object(type_name);
                    self.graph
                        .object_mut(object)
                        .properties
                        .push(("Value".to_string(), PropertyValue::Value(value)));
                    self.obj_stack.push(object);
                }

                // A nested root inside a node frame; hand the opcode back to
                // the root frame.
                Opcode::RootBegin | Opcode::RootNamespace => {
                    self.buffer.set_position(start);
                    self.read_root(end)?;
                    if mode == ReadMode::SingleObject {
                        return Ok(());
                    }
                }

                Opcode::CreateType | Opcode::CreateTypeEx => {
                    let type_name = self.read_type_name()?;
                    let argument = self.read_value()?;
                    record!(self, start, "createtype {} ({})", type_name, argument);
                    let object = self.graph.new_object(type_name.clone());
                    self.graph
                        .object_mut(object)
                        .properties
                        .push(("x:Class".to_string(), PropertyValue::Value(Value::Str(type_name))));
                    self.graph
                        .object_mut(object)
                        .properties
                        .push(("x:Arguments".to_string(), PropertyValue::Value(argument)));
                    self.obj_stack.push(object);
                }

                Opcode::Property | Opcode::PropertyEx => {
                    let name = self.read_property_name()?;
                    let value = self.read_value()?;
                    record!(self, start, "property {} = {}", name, value);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name, PropertyValue::Value(value)));
                }

                Opcode::ResolvedProperty => {
                    let name = self.read_property_name()?;
                    let value = self.read_property_name()?;
                    record!(self, start, "resolvedproperty {} = {}", name, value);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name, PropertyValue::Value(Value::Str(value))));
                }

                Opcode::StyleTargetType => {
                    let name = self.read_property_name()?;
                    let type_name = self.read_type_name()?;
                    record!(self, start, "targettype {} = {}", name, type_name);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name, PropertyValue::Value(Value::Str(type_name))));
                }

                Opcode::StaticResource => {
                    let name = self.read_property_name()?;
                    let key = self.read_value()?;
                    let value = format!("{{StaticResource {}}}", key);
                    record!(self, start, "staticresource {} = {}", name, value);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name, PropertyValue::Value(Value::Str(value))));
                }

                Opcode::ThemeResource => {
                    let name = self.read_property_name()?;
                    let key = self.read_value()?;
                    let value = format!("{{ThemeResource {}}}", key);
                    record!(self, start, "themeresource {} = {}", name, value);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name, PropertyValue::Value(Value::Str(value))));
                }

                Opcode::TemplateBinding => {
                    let name = self.read_property_name()?;
                    let path = self.read_property_name()?;
                    let value = format!("{{TemplateBinding {}}}", path);
                    record!(self, start, "templatebinding {} = {}", name, value);
                    let current = self.current()?;
                    self.graph
                        .object_mut(current)
                        .properties
                        .push((name, PropertyValue::Value(Value::Str(value))));
                }

                Opcode::StaticResourceObj => {
                    let key = self.read_value()?;
                    record!(self, start, "staticresourceobj {}", key);
                    let object = self.graph.new_object("StaticResource".to_string());
                    self.graph
                        .object_mut(object)
                        .properties
                        .push(("ResourceKey".to_string(), PropertyValue::Value(key)));
                    self.obj_stack.push(object);
                    if mode == ReadMode::SingleObject {
                        return Ok(());
                    }
                }

                Opcode::ThemeResourceObj => {
                    let key = self.read_value()?;
                    record!(self, start, "themeresourceobj {}", key);
                    let object = self.graph.new_object("ThemeResource".to_string());
                    self.graph
                        .object_mut(object)
                        .properties
                        .push(("ResourceKey".to_string(), PropertyValue::Value(key)));
                    self.obj_stack.push(object);
                    if mode == ReadMode::SingleObject {
                        return Ok(());
                    }
                }

                Opcode::CondBegin => {
                    let type_name = self.read_type_name()?;
                    let argument = self.buffer.read_len_string()?;
                    record!(self, start, "condbegin {}({})", type_name, argument);
                    self.indent(1);
                }

                Opcode::CondEnd => {
                    self.indent(-1);
                    record!(self, start, "condend");
                }

                // Observed once in the wild; best effort.
                Opcode::UnknownPop => {
                    self.obj_stack.pop();
                    record!(self, start, "unknownpop");
                }

                _ => {
                    return Err(XbfError::UnknownOpcode {
                        opcode: byte,
                        position: start,
                    })
                }
            }

            if mode == ReadMode::SingleNode {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Opcode 0x04 means three different things depending on where the
    /// stacks currently point; keeping the decision in one place keeps it
    /// auditable.
    fn read_verbatim(&mut self, start: u64) -> Result<()> {
        let current = self.current()?;
        let children = self.graph.object(current).children;
        if self.col_stack.last() != Some(&children) {
            // Inside an explicit collection the payload is a text node.
            let value = self.read_value()?;
            record!(self, start, "verbatim \"{}\"", value);
            let object = self.graph.new_object("Verbatim".to_string());
            self.graph
                .object_mut(object)
                .properties
                .push(("Value".to_string(), PropertyValue::Value(value)));
            self.obj_stack.push(object);
        } else if self.root_stack.last() == Some(&current) {
            let value = self.read_value()?;
            record!(self, start, "verbatim x:Class = {}", value);
            self.graph
                .object_mut(current)
                .properties
                .push(("x:Class".to_string(), PropertyValue::Value(value)));
        } else {
            // Class modifiers and event handler names; only the trace keeps
            // them.
            let value = self.read_value()?;
            record!(self, start, "verbatim {}", value);
        }
        Ok(())
    }

    /// # Node section references (0x0F)
    ///
    /// | Kind      | Payload |
    /// | --------- | ------- |
    /// | 2, 8, 11  | style, `11` with the extended tail |
    /// | 7, 371, 10 | resource dictionary, increasingly extended |
    /// | 5         | visual state metadata, then the state objects |
    /// | 6, 746, 9 | deferred element |
    fn read_section_reference(&mut self, start: u64) -> Result<()> {
        let index = self.buffer.read_7bit_varint()? as usize;
        let zero_position = self.buffer.position();
        if self.buffer.read_u16::<LittleEndian>()? != 0 {
            return Err(XbfError::UnexpectedByte {
                position: zero_position,
            });
        }
        let kind = self.buffer.read_7bit_varint()?;
        record!(self, start, "refsection {} kind {}", index, kind);
        self.indent(1);

        match kind {
            2 | 8 => self.read_style(index, false)?,
            11 => self.read_style(index, true)?,
            7 => self.read_resource_dictionary(index, false, false)?,
            371 => self.read_resource_dictionary(index, true, false)?,
            10 => self.read_resource_dictionary(index, true, true)?,
            5 => {
                self.skip_visual_state_bytes()?;
                self.read_node_section(index)?;
            }
            6 => self.read_deferred_element(index, true, false)?,
            746 => self.read_deferred_element(index, false, false)?,
            9 => self.read_deferred_element(index, true, true)?,
            _ => return Err(XbfError::UnknownSectionKind { kind }),
        }

        self.indent(-1);
        record!(self, self.buffer.position(), "refsectionend");
        Ok(())
    }

    /// # DataTemplate (0x11)
    ///
    /// The template body lives in its own node section; the resource names
    /// listed inline reappear inside that section.
    fn read_data_template(&mut self, start: u64) -> Result<()> {
        let name = self.read_property_name()?;
        let index = self.buffer.read_7bit_varint()? as usize;
        let static_count = self.buffer.read_7bit_varint()?;
        let theme_count = self.buffer.read_7bit_varint()?;
        for _ in 0..static_count + theme_count {
            self.buffer.read_u16::<LittleEndian>()?;
        }
        record!(
            self,
            start,
            "datatemplate {} section {} ({} resources)",
            name,
            index,
            static_count + theme_count
        );
        self.indent(1);
        self.read_node_section(index)?;
        self.indent(-1);
        let value = self.pop_object()?;
        let current = self.current()?;
        self.graph
            .object_mut(current)
            .properties
            .push((name, PropertyValue::Object(value)));
        Ok(())
    }

    /// # Style setters
    ///
    /// | Setter type | Layout |
    /// | ----------- | ------ |
    /// | 0x01, 0x02  | property via string table, implementing type, offset; single-node read with the setter pushed |
    /// | 0x11, 0x12  | property via property table, offset; single-node read with the setter pushed |
    /// | 0x08, 0x18  | property (0x18 adds the implementing type), offset; single-object read yields the value |
    /// | 0x20, 0x30  | property (0x30 adds the implementing type), inline value |
    /// | 0x40, 0x50  | property only when not extended, offset; single-object read yields a ready Setter |
    /// | 0xC0, 0xD0  | a varint equal to 1, then like 0x40/0x50 |
    fn read_style(&mut self, index: usize, extended: bool) -> Result<()> {
        let setter_count = self.buffer.read_7bit_varint()?;
        for _ in 0..setter_count {
            let position = self.buffer.position();
            let setter_type = self.buffer.read_u8()?;
            match setter_type {
                0x01 | 0x02 => {
                    let key_position = self.buffer.position();
                    let string_id = self.buffer.read_u16::<LittleEndian>()?;
                    let property = self
                        .metadata
                        .string(string_id as u32)
                        .ok_or(XbfError::UnexpectedByte {
                            position: key_position,
                        })?
                        .to_string();
                    let implementing = self.read_type_name()?;
                    let offset = self.buffer.read_7bit_varint()? as u64;
                    let setter = self.new_setter(format!("{}.{}", implementing, property));
                    self.obj_stack.push(setter);
                    self.read_node_in_node_section(index, offset)?;
                    self.obj_stack.pop();
                    self.append_to_current_collection(setter)?;
                }
                0x11 | 0x12 => {
                    let property = self.read_property_name()?;
                    let offset = self.buffer.read_7bit_varint()? as u64;
                    let setter = self.new_setter(property);
                    self.obj_stack.push(setter);
                    self.read_node_in_node_section(index, offset)?;
                    self.obj_stack.pop();
                    self.append_to_current_collection(setter)?;
                }
                0x08 | 0x18 => {
                    let property = self.read_property_name()?;
                    let implementing = if setter_type == 0x18 {
                        Some(self.read_type_name()?)
                    } else {
                        None
                    };
                    let offset = self.buffer.read_7bit_varint()? as u64;
                    let value = self.read_object_in_node_section(index, offset)?;
                    let setter = self.new_setter(qualified(implementing, property));
                    self.graph
                        .object_mut(setter)
                        .properties
                        .push(("Value".to_string(), PropertyValue::Object(value)));
                    self.append_to_current_collection(setter)?;
                }
                0x20 | 0x30 => {
                    let property = self.read_property_name()?;
                    let implementing = if setter_type == 0x30 {
                        Some(self.read_type_name()?)
                    } else {
                        None
                    };
                    let value = self.read_value()?;
                    let setter = self.new_setter(qualified(implementing, property));
                    self.graph
                        .object_mut(setter)
                        .properties
                        .push(("Value".to_string(), PropertyValue::Value(value)));
                    self.append_to_current_collection(setter)?;
                }
                0x40 | 0x50 => {
                    if !extended {
                        self.read_property_name()?;
                    }
                    let offset = self.buffer.read_7bit_varint()? as u64;
                    let setter = self.read_object_in_node_section(index, offset)?;
                    self.append_to_current_collection(setter)?;
                }
                0xC0 | 0xD0 => {
                    let marker_position = self.buffer.position();
                    if self.buffer.read_7bit_varint()? != 1 {
                        return Err(XbfError::UnexpectedByte {
                            position: marker_position,
                        });
                    }
                    if !extended {
                        self.read_property_name()?;
                    }
                    let offset = self.buffer.read_7bit_varint()? as u64;
                    let setter = self.read_object_in_node_section(index, offset)?;
                    self.append_to_current_collection(setter)?;
                }
                _ => return Err(XbfError::UnexpectedByte { position }),
            }
        }
        if extended {
            let position = self.buffer.position();
            if self.buffer.read_7bit_varint()? != 0 {
                return Err(XbfError::UnexpectedByte { position });
            }
        }
        Ok(())
    }

    /// # Resource dictionaries
    ///
    /// Keyed resources first, then a repeated key subset, then the
    /// target-typed styles. The tail depends on the dictionary flavor.
    fn read_resource_dictionary(
        &mut self,
        index: usize,
        extended: bool,
        extended2: bool,
    ) -> Result<()> {
        let resource_count = self.buffer.read_7bit_varint()?;
        for _ in 0..resource_count {
            let key_position = self.buffer.position();
            let key_id = self.buffer.read_u16::<LittleEndian>()?;
            let key = self
                .metadata
                .string(key_id as u32)
                .ok_or(XbfError::UnexpectedByte {
                    position: key_position,
                })?
                .to_string();
            let offset = self.buffer.read_7bit_varint()? as u64;
            let object = self.read_object_in_node_section(index, offset)?;
            self.graph.object_mut(object).key = Some(key);
            self.append_to_current_collection(object)?;
        }

        self.skip_key_subset()?;

        let style_count = self.buffer.read_7bit_varint()?;
        for _ in 0..style_count {
            let _target_type = self.buffer.read_u16::<LittleEndian>()?;
            let offset = self.buffer.read_7bit_varint()? as u64;
            let object = self.read_object_in_node_section(index, offset)?;
            self.append_to_current_collection(object)?;
        }

        if extended2 {
            // Placeholders for extensions no known file uses.
            for _ in 0..3 {
                let position = self.buffer.position();
                if self.buffer.read_7bit_varint()? != 0 {
                    return Err(XbfError::UnexpectedByte { position });
                }
            }
        } else {
            if extended {
                let position = self.buffer.position();
                if self.buffer.read_7bit_varint()? != 0 {
                    return Err(XbfError::UnexpectedByte { position });
                }
            }
            self.skip_key_subset()?;
        }
        Ok(())
    }

    /// A varint count of u16 string ids repeating keys declared elsewhere.
    fn skip_key_subset(&mut self) -> Result<()> {
        let count = self.buffer.read_7bit_varint()?;
        for _ in 0..count {
            self.buffer.read_u16::<LittleEndian>()?;
        }
        Ok(())
    }

    /// # Deferred elements
    ///
    /// The inline property pairs reappear in the referenced section, so only
    /// the section result is kept.
    fn read_deferred_element(&mut self, index: usize, extended: bool, extended2: bool) -> Result<()> {
        let _name_id = self.buffer.read_u16::<LittleEndian>()?;
        if extended {
            let count = self.buffer.read_7bit_varint()?;
            for _ in 0..count {
                self.read_property_name()?;
                self.read_value()?;
            }
        }
        self.read_node_section(index)?;
        let child = self.pop_object()?;
        let current = self.current()?;
        let children = self.graph.object(current).children;
        self.graph.collection_mut(children).items.push(child);
        if extended2 {
            self.buffer.read_7bit_varint()?;
        }
        Ok(())
    }

    /// # Visual state metadata
    ///
    /// The block in front of a kind-5 section describes visual states,
    /// groups and transitions. Nothing in it is extracted, but it has to be
    /// consumed positionally, and the varints observed to be constant are
    /// checked.
    fn skip_visual_state_bytes(&mut self) -> Result<()> {
        let state_count = self.buffer.read_7bit_varint()?;
        for _ in 0..state_count {
            self.buffer.read_7bit_varint()?; // group membership
        }
        let position = self.buffer.position();
        if self.buffer.read_7bit_varint()? != state_count {
            return Err(XbfError::UnexpectedByte { position });
        }
        for _ in 0..state_count {
            self.buffer.read_u16::<LittleEndian>()?; // state name
            self.buffer.read_7bit_varint()?;
            self.buffer.read_7bit_varint()?;
            let setter_count = self.buffer.read_7bit_varint()?;
            for _ in 0..setter_count {
                self.buffer.read_7bit_varint()?;
            }
            let adaptive_trigger_count = self.buffer.read_7bit_varint()?;
            for _ in 0..adaptive_trigger_count {
                let inner = self.buffer.read_7bit_varint()?;
                for _ in 0..inner {
                    self.buffer.read_7bit_varint()?;
                }
            }
            let state_trigger_count = self.buffer.read_7bit_varint()?;
            for _ in 0..state_trigger_count {
                self.buffer.read_7bit_varint()?;
            }
            // Observed 0 or 2 offsets per state.
            let offset_count = self.buffer.read_7bit_varint()?;
            for _ in 0..offset_count {
                self.buffer.read_7bit_varint()?;
            }
            let position = self.buffer.position();
            if self.buffer.read_7bit_varint()? != 0 {
                return Err(XbfError::UnexpectedByte { position });
            }
        }
        let group_count = self.buffer.read_7bit_varint()?;
        for _ in 0..group_count {
            self.buffer.read_u16::<LittleEndian>()?; // group name
            self.buffer.read_7bit_varint()?; // observed 1 or 2
            self.buffer.read_7bit_varint()?; // offset
        }
        let transition_count = self.buffer.read_7bit_varint()?;
        for _ in 0..transition_count {
            self.buffer.read_u16::<LittleEndian>()?; // "to" state
            self.buffer.read_u16::<LittleEndian>()?; // "from" state
            self.buffer.read_7bit_varint()?; // offset
        }
        self.buffer.read_7bit_varint()?; // observed 1 or 2
        let count2 = self.buffer.read_7bit_varint()?;
        for _ in 0..count2 {
            self.buffer.read_7bit_varint()?;
            self.buffer.read_7bit_varint()?;
            self.buffer.read_7bit_varint()?;
        }
        let count3 = self.buffer.read_7bit_varint()?;
        for _ in 0..count3 {
            self.buffer.read_7bit_varint()?;
        }
        self.buffer.read_7bit_varint()?;
        let string_count = self.buffer.read_7bit_varint()?;
        for _ in 0..string_count {
            self.buffer.read_u16::<LittleEndian>()?;
        }
        Ok(())
    }

    /// Interprets a whole sibling section in place, preserving the read
    /// position around the descent.
    fn read_node_section(&mut self, index: usize) -> Result<()> {
        let (start, end) = self.section(index, self.buffer.position())?;
        self.enter_section()?;
        trace!("descending into node section {} at 0x{:X}", index, start);
        let saved_position = self.buffer.position();
        let saved_section = self.swap_trace_section(index);
        self.buffer.set_position(start);
        let result = self.read_nodes(end, ReadMode::Nodes);
        self.buffer.set_position(saved_position);
        self.swap_trace_section(saved_section);
        self.depth -= 1;
        result
    }

    /// Reads the single object encoded at `offset` into a sibling section
    /// and hands it back popped, with the stacks exactly as they were.
    fn read_object_in_node_section(&mut self, index: usize, offset: u64) -> Result<ObjectId> {
        let (start, _) = self.section(index, self.buffer.position())?;
        self.enter_section()?;
        let saved_position = self.buffer.position();
        let saved_section = self.swap_trace_section(index);
        let obj_depth = self.obj_stack.len();
        let col_depth = self.col_stack.len();
        self.buffer.set_position(start + offset);
        let result = self.read_nodes(UNBOUNDED, ReadMode::SingleObject);
        self.buffer.set_position(saved_position);
        self.swap_trace_section(saved_section);
        self.depth -= 1;
        result?;
        let object = self.obj_stack.pop().ok_or(XbfError::StackCorruption)?;
        if self.obj_stack.len() != obj_depth || self.col_stack.len() != col_depth {
            return Err(XbfError::StackCorruption);
        }
        Ok(object)
    }

    /// Executes exactly one node at `offset` into a sibling section, with
    /// whatever the caller pushed as its target.
    fn read_node_in_node_section(&mut self, index: usize, offset: u64) -> Result<()> {
        let (start, _) = self.section(index, self.buffer.position())?;
        self.enter_section()?;
        let saved_position = self.buffer.position();
        let saved_section = self.swap_trace_section(index);
        let obj_depth = self.obj_stack.len();
        let col_depth = self.col_stack.len();
        self.buffer.set_position(start + offset);
        let result = self.read_nodes(UNBOUNDED, ReadMode::SingleNode);
        self.buffer.set_position(saved_position);
        self.swap_trace_section(saved_section);
        self.depth -= 1;
        result?;
        if self.obj_stack.len() != obj_depth || self.col_stack.len() != col_depth {
            return Err(XbfError::StackCorruption);
        }
        Ok(())
    }

    fn section(&self, index: usize, position: u64) -> Result<(u64, u64)> {
        let section = self
            .metadata
            .node_section(index)
            .ok_or(XbfError::UnexpectedByte { position })?;
        self.bounds(section, position)
    }

    fn bounds(&self, section: &NodeSection, position: u64) -> Result<(u64, u64)> {
        if section.node_offset < 0 || section.positional_offset < section.node_offset {
            return Err(XbfError::UnexpectedByte { position });
        }
        let base = self.metadata.node_section_base;
        Ok((
            base + section.node_offset as u64,
            base + section.positional_offset as u64,
        ))
    }

    fn enter_section(&mut self) -> Result<()> {
        if self.depth >= self.depth_limit {
            return Err(XbfError::DepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    fn new_setter(&mut self, property: String) -> ObjectId {
        let setter = self.graph.new_object("Setter".to_string());
        self.graph
            .object_mut(setter)
            .properties
            .push(("Property".to_string(), PropertyValue::Value(Value::Str(property))));
        setter
    }

    fn append_to_current_collection(&mut self, object: ObjectId) -> Result<()> {
        let collection = self.current_collection()?;
        self.graph.collection_mut(collection).items.push(object);
        Ok(())
    }

    fn current(&self) -> Result<ObjectId> {
        self.obj_stack.last().copied().ok_or(XbfError::StackCorruption)
    }

    fn pop_object(&mut self) -> Result<ObjectId> {
        self.obj_stack.pop().ok_or(XbfError::StackCorruption)
    }

    fn current_collection(&self) -> Result<CollectionId> {
        self.col_stack.last().copied().ok_or(XbfError::StackCorruption)
    }

    fn read_property_name(&mut self) -> Result<String> {
        let id = self.buffer.read_u16::<LittleEndian>()?;
        Ok(self.names.property_name(id))
    }

    fn read_type_name(&mut self) -> Result<String> {
        let id = self.buffer.read_u16::<LittleEndian>()?;
        Ok(self.names.type_name(id))
    }

    fn read_value(&mut self) -> Result<Value> {
        read_value(self.buffer, &self.names)
    }

    fn indent(&mut self, delta: i32) {
        if let Some(trace) = self.trace.as_mut() {
            trace.indent = (trace.indent as i32 + delta).max(0) as usize;
        }
    }

    fn swap_trace_section(&mut self, index: usize) -> usize {
        match self.trace.as_mut() {
            Some(trace) => std::mem::replace(&mut trace.section, index),
            None => 0,
        }
    }

    fn record(&mut self, start: u64, text: String) {
        if self.trace.is_none() {
            return;
        }
        let object_stack: Vec<String> = self
            .obj_stack
            .iter()
            .map(|id| self.graph.object(*id).type_name.clone())
            .collect();
        let collection_stack: Vec<String> = self
            .col_stack
            .iter()
            .map(|id| {
                let collection = self.graph.collection(*id);
                format!(
                    "{}.{}",
                    self.graph.object(collection.owner).type_name,
                    collection.owner_property
                )
            })
            .collect();
        let bytes = self.buffer.get_ref()[start as usize..self.buffer.position() as usize].to_vec();
        if let Some(trace) = self.trace.as_mut() {
            trace.commands.push(Command {
                position: start,
                bytes,
                node_section: trace.section,
                text,
                object_stack,
                collection_stack,
                indent: trace.indent,
            });
        }
    }
}

fn qualified(implementing: Option<String>, property: String) -> String {
    match implementing {
        Some(type_name) => format!("{}.{}", type_name, property),
        None => property,
    }
}
