
use super::*;

/// Handle to a [`XamlObject`] inside its [`XamlGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(pub(crate) usize);

/// Handle to a [`XamlCollection`] inside its [`XamlGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionId(pub(crate) usize);

/// One property slot of an object. Properties keep their stream order and
/// may repeat if the stream emitted them twice.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Value(Value),
    Object(ObjectId),
    Collection(CollectionId),
}

/// An element of the reconstructed XAML tree.
#[derive(Debug, Clone)]
pub struct XamlObject {
    pub type_name: String,
    pub name: Option<String>,
    pub uid: Option<String>,
    pub key: Option<String>,
    pub connection_id: Option<i32>,
    pub properties: Vec<(String, PropertyValue)>,
    /// Implicit content collection, created together with the object.
    pub children: CollectionId,
}

impl XamlObject {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// An ordered run of objects belonging to one property of one owner.
///
/// The owner link is a handle, not ownership; the graph arena owns both
/// sides, which keeps serialization of the (acyclic) tree bounded.
#[derive(Debug, Clone)]
pub struct XamlCollection {
    pub owner: ObjectId,
    pub owner_property: String,
    pub items: Vec<ObjectId>,
}

/// Arena holding every object and collection produced by one parse.
///
/// Parents reference children through ids, so the graph hands out plain
/// shared references and the interpreter can keep several "open" objects on
/// its stacks while they are already reachable from their parents.
#[derive(Debug, Default)]
pub struct XamlGraph {
    objects: Vec<XamlObject>,
    collections: Vec<XamlCollection>,
}

impl XamlGraph {
    pub fn new() -> XamlGraph {
        XamlGraph::default()
    }

    /// Creates an object together with its implicit `Children` collection.
    pub(crate) fn new_object(&mut self, type_name: String) -> ObjectId {
        let object = ObjectId(self.objects.len());
        let children = CollectionId(self.collections.len());
        self.collections.push(XamlCollection {
            owner: object,
            owner_property: "Children".to_string(),
            items: Vec::new(),
        });
        self.objects.push(XamlObject {
            type_name,
            name: None,
            uid: None,
            key: None,
            connection_id: None,
            properties: Vec::new(),
            children,
        });
        object
    }

    pub(crate) fn new_collection(&mut self, owner: ObjectId, owner_property: String) -> CollectionId {
        let collection = CollectionId(self.collections.len());
        self.collections.push(XamlCollection {
            owner,
            owner_property,
            items: Vec::new(),
        });
        collection
    }

    pub fn object(&self, id: ObjectId) -> &XamlObject {
        &self.objects[id.0]
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut XamlObject {
        &mut self.objects[id.0]
    }

    pub fn collection(&self, id: CollectionId) -> &XamlCollection {
        &self.collections[id.0]
    }

    pub(crate) fn collection_mut(&mut self, id: CollectionId) -> &mut XamlCollection {
        &mut self.collections[id.0]
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &XamlObject)> + '_ {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i), o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_owns_its_children_collection() {
        let mut graph = XamlGraph::new();
        let grid = graph.new_object("Grid".to_string());
        let children = graph.object(grid).children;
        assert_eq!(graph.collection(children).owner, grid);
        assert_eq!(graph.collection(children).owner_property, "Children");
        assert!(graph.collection(children).items.is_empty());
    }

    #[test]
    fn property_lookup_finds_first_occurrence() {
        let mut graph = XamlGraph::new();
        let grid = graph.new_object("Grid".to_string());
        graph
            .object_mut(grid)
            .properties
            .push(("Width".to_string(), PropertyValue::Value(Value::Int(4))));
        graph
            .object_mut(grid)
            .properties
            .push(("Width".to_string(), PropertyValue::Value(Value::Int(8))));
        assert_eq!(
            graph.object(grid).property("Width"),
            Some(&PropertyValue::Value(Value::Int(4)))
        );
        assert_eq!(graph.object(grid).properties.len(), 2);
    }
}
