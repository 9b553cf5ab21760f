//! The lowered object model.
//!
//! Objects are what the compiler builds out of resolved nodes: modules,
//! classes, fields, functions, parameters, locals, overload groups, generic
//! machinery and native functions. They live in a single arena and reference
//! each other through stable [`ObjectLocation`] indices.
//!
//! Objects go through two stages: *construct* creates the skeleton (enough
//! for others to reference) and *define* fills it in. After definition an
//! object is not mutated again.

use indexmap::IndexMap;
use strum_macros::EnumDiscriminants;

use crate::vm::Instruction;

pub mod overloading;
pub mod types;
pub mod values;

pub use types::{FloatKind, IntKind, TypeValue};
pub use values::{Instance, Value};

/// A unique identifier for an object within the compilation context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectLocation(pub usize);

impl From<usize> for ObjectLocation {
    fn from(location: usize) -> Self {
        ObjectLocation(location)
    }
}

/// How a class member is bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Binding {
    Instance,
    Static,
    Class,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub types: Vec<ObjectLocation>,
    pub functions: Vec<ObjectLocation>,
    pub submodules: Vec<ObjectLocation>,
    /// The module's visible members by name
    pub members: IndexMap<String, Value>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            functions: Vec::new(),
            submodules: Vec::new(),
            members: IndexMap::new(),
        }
    }

    pub fn get_name(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.members.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: Option<String>,
    pub generic_parameters: Vec<ObjectLocation>,
    pub base: Option<ObjectLocation>,
    /// Typeclasses this class declares itself an instance of
    pub specifications: Vec<ObjectLocation>,
    pub fields: Vec<ObjectLocation>,
    pub methods: Vec<ObjectLocation>,
    pub constructors: Vec<ObjectLocation>,
    pub nested_definitions: Vec<ObjectLocation>,
}

impl Class {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            generic_parameters: Vec::new(),
            base: None,
            specifications: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            nested_definitions: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous class>")
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub field_type: TypeValue,
    pub binding: Binding,
    pub owner: ObjectLocation,
    /// Slot index inside instances of the owning class
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub parameter_type: TypeValue,
    /// Argument slot index
    pub index: usize,
    /// Fixed instructions producing the default value, if any
    pub default_value: Option<Vec<Instruction>>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            parameter_type: TypeValue::Any,
            index,
            default_value: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub target_type: TypeValue,
    /// Local slot index inside the frame
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionSignature {
    pub positional_parameters: Vec<ObjectLocation>,
    pub named_parameters: Vec<ObjectLocation>,
    pub variadic_positional_parameter: Option<ObjectLocation>,
    pub variadic_named_parameter: Option<ObjectLocation>,
    pub return_type: TypeValue,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionBody {
    pub instructions: Vec<Instruction>,
    pub locals: Vec<ObjectLocation>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    pub generic_parameters: Vec<ObjectLocation>,
    pub signature: FunctionSignature,
    /// `None` for bodyless declarations
    pub body: Option<FunctionBody>,
}

impl Function {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            generic_parameters: Vec::new(),
            signature: FunctionSignature::default(),
            body: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous function>")
    }
}

/// A function owned by a class. The receiver is the first positional
/// parameter of the signature; call sites prepend it before matching.
#[derive(Debug, Clone)]
pub struct Method {
    pub function: Function,
    pub binding: Binding,
    pub owner: ObjectLocation,
}

#[derive(Debug, Clone)]
pub struct OverloadGroup {
    pub name: String,
    /// Group of the same name in an enclosing scope
    pub parent: Option<ObjectLocation>,
    /// Membership in declaration order
    pub overloads: Vec<ObjectLocation>,
}

#[derive(Debug, Clone)]
pub struct GenericParameter {
    pub name: String,
}

/// A class specialized with concrete type arguments, cached by origin plus
/// the argument tuple.
#[derive(Debug, Clone)]
pub struct GenericInstance {
    pub origin: ObjectLocation,
    pub arguments: Vec<TypeValue>,
    /// origin generic parameter -> argument type
    pub substitutions: IndexMap<ObjectLocation, TypeValue>,
}

#[derive(Debug, Clone)]
pub struct Typeclass {
    pub name: String,
    /// Required member signatures (bodyless methods)
    pub members: Vec<ObjectLocation>,
    pub implementations: Vec<TypeclassImplementation>,
}

#[derive(Debug, Clone)]
pub struct TypeclassImplementation {
    pub target: TypeValue,
    pub members: Vec<ObjectLocation>,
}

/// Handler signature for native functions. Implementations must not block.
pub type NativeHandler = fn(&[Value]) -> Result<Value, String>;

/// A function implemented by the host, used by the built-in modules and the
/// operator registry.
#[derive(Debug, Clone)]
pub struct NativeFunction {
    pub name: String,
    pub parameter_types: Vec<TypeValue>,
    pub return_type: TypeValue,
    pub handler: NativeHandler,
}

/// All object kinds, tagged.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(ObjectKind))]
pub enum Object {
    Module(Module),
    Class(Class),
    Field(Field),
    Function(Function),
    Method(Method),
    Parameter(Parameter),
    Local(Local),
    OverloadGroup(OverloadGroup),
    GenericParameter(GenericParameter),
    GenericInstance(GenericInstance),
    Typeclass(Typeclass),
    NativeFunction(NativeFunction),
}

/// Arena of all objects in one compilation context.
#[derive(Debug, Default)]
pub struct ObjectArena {
    objects: Vec<Object>,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: Object) -> ObjectLocation {
        let location = ObjectLocation(self.objects.len());
        self.objects.push(object);
        location
    }

    pub fn get(&self, location: ObjectLocation) -> &Object {
        &self.objects[location.0]
    }

    pub fn get_mut(&mut self, location: ObjectLocation) -> &mut Object {
        &mut self.objects[location.0]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectLocation, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (ObjectLocation(index), object))
    }

    // region typed accessors

    pub fn function(&self, location: ObjectLocation) -> Option<&Function> {
        match self.get(location) {
            Object::Function(function) => Some(function),
            Object::Method(method) => Some(&method.function),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, location: ObjectLocation) -> Option<&mut Function> {
        match self.get_mut(location) {
            Object::Function(function) => Some(function),
            Object::Method(method) => Some(&mut method.function),
            _ => None,
        }
    }

    pub fn class(&self, location: ObjectLocation) -> Option<&Class> {
        match self.get(location) {
            Object::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn class_mut(&mut self, location: ObjectLocation) -> Option<&mut Class> {
        match self.get_mut(location) {
            Object::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn parameter(&self, location: ObjectLocation) -> Option<&Parameter> {
        match self.get(location) {
            Object::Parameter(parameter) => Some(parameter),
            _ => None,
        }
    }

    pub fn local(&self, location: ObjectLocation) -> Option<&Local> {
        match self.get(location) {
            Object::Local(local) => Some(local),
            _ => None,
        }
    }

    pub fn field(&self, location: ObjectLocation) -> Option<&Field> {
        match self.get(location) {
            Object::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn group(&self, location: ObjectLocation) -> Option<&OverloadGroup> {
        match self.get(location) {
            Object::OverloadGroup(group) => Some(group),
            _ => None,
        }
    }

    pub fn module(&self, location: ObjectLocation) -> Option<&Module> {
        match self.get(location) {
            Object::Module(module) => Some(module),
            _ => None,
        }
    }

    pub fn module_mut(&mut self, location: ObjectLocation) -> Option<&mut Module> {
        match self.get_mut(location) {
            Object::Module(module) => Some(module),
            _ => None,
        }
    }

    // endregion

    /// Display name for diagnostics.
    pub fn display_name(&self, location: ObjectLocation) -> String {
        match self.get(location) {
            Object::Module(module) => module.name.clone(),
            Object::Class(class) => class.display_name().to_string(),
            Object::Field(field) => field.name.clone(),
            Object::Function(function) => function.display_name().to_string(),
            Object::Method(method) => method.function.display_name().to_string(),
            Object::Parameter(parameter) => parameter.name.clone(),
            Object::Local(local) => local.name.clone(),
            Object::OverloadGroup(group) => group.name.clone(),
            Object::GenericParameter(parameter) => parameter.name.clone(),
            Object::GenericInstance(instance) => {
                let origin = self.display_name(instance.origin);
                let arguments = instance
                    .arguments
                    .iter()
                    .map(|argument| types::type_name(self, argument))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{origin}[{arguments}]")
            }
            Object::Typeclass(typeclass) => typeclass.name.clone(),
            Object::NativeFunction(native) => native.name.clone(),
        }
    }

    /// Member lookup over objects that expose a scope (the scope protocol).
    ///
    /// Returns `None` both for unknown members and for objects that are not
    /// scopes at all; callers distinguish via [`ObjectArena::is_scope`].
    pub fn get_member(&self, location: ObjectLocation, name: &str) -> Option<MemberResult> {
        match self.get(location) {
            Object::Module(module) => module.get_name(name).cloned().map(MemberResult::Value),
            Object::Class(class) => self.class_member(location, class, name),
            Object::GenericInstance(instance) => {
                let class = self.class(instance.origin)?;
                self.class_member(instance.origin, class, name)
            }
            Object::Typeclass(typeclass) => typeclass
                .members
                .iter()
                .find(|member| self.function(**member).map(|f| f.name.as_deref() == Some(name)).unwrap_or(false))
                .map(|member| MemberResult::MethodGroup(vec![*member])),
            _ => None,
        }
    }

    pub fn is_scope(&self, location: ObjectLocation) -> bool {
        matches!(
            self.get(location),
            Object::Module(_) | Object::Class(_) | Object::GenericInstance(_) | Object::Typeclass(_)
        )
    }

    fn class_member(&self, _location: ObjectLocation, class: &Class, name: &str) -> Option<MemberResult> {
        for field in class.fields.iter() {
            if self.field(*field).map(|f| f.name == name).unwrap_or(false) {
                return Some(MemberResult::Field(*field));
            }
        }

        let methods: Vec<ObjectLocation> = class
            .methods
            .iter()
            .filter(|method| {
                self.function(**method)
                    .map(|function| function.name.as_deref() == Some(name))
                    .unwrap_or(false)
            })
            .copied()
            .collect();
        if !methods.is_empty() {
            return Some(MemberResult::MethodGroup(methods));
        }

        for nested in class.nested_definitions.iter() {
            if self.class(*nested).map(|c| c.name.as_deref() == Some(name)).unwrap_or(false) {
                return Some(MemberResult::Value(Value::Type(TypeValue::Class(*nested))));
            }
        }

        // inherited members
        if let Some(base) = class.base {
            if let Some(base_class) = self.class(base) {
                return self.class_member(base, base_class, name);
            }
        }

        None
    }
}

/// The result of a member lookup through the scope protocol.
#[derive(Debug, Clone)]
pub enum MemberResult {
    /// A plain value (module member, nested class, ...)
    Value(Value),
    /// An instance field; the access site emits `LoadField`
    Field(ObjectLocation),
    /// One or more methods sharing the name; the access site produces a
    /// bound member for later call-site specialization
    MethodGroup(Vec<ObjectLocation>),
}
