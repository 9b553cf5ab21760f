//! Class, typeclass and generic-instance compilation.

use indexmap::IndexMap;

use crate::{
    error::ZsError,
    objects::{
        Binding, Class, Field, GenericInstance, Object, ObjectLocation, Typeclass,
        TypeclassImplementation, TypeValue,
    },
    resolved::{NodeLocation, ResolvedClass, ResolvedNode, ResolvedTypeclass, ResolvedTypeclassImpl},
};

use super::NodeCompiler;

impl NodeCompiler<'_> {
    pub(crate) fn construct_class(
        &mut self,
        node: NodeLocation,
        class: &ResolvedClass,
    ) -> Result<ObjectLocation, ZsError> {
        let location = self.ctx.objects.add(Object::Class(Class::new(class.name.clone())));
        self.ctx.compiler_cache.insert(node, location);

        for generic in class.generic_parameters.iter() {
            let parameter = self.construct_generic_parameter(*generic)?;
            if let Some(compiled) = self.ctx.objects.class_mut(location) {
                compiled.generic_parameters.push(parameter);
            }
        }

        for item in class.items.iter() {
            match self.ctx.nodes.get(*item).clone() {
                // members named `new` are constructors
                ResolvedNode::Function(function) => {
                    let method = self.construct_function(*item, &function, Some(location))?;
                    let compiled = self.ctx.objects.class_mut(location).unwrap();
                    if function.name.as_deref() == Some("new") {
                        compiled.constructors.push(method);
                    } else {
                        compiled.methods.push(method);
                    }
                }
                ResolvedNode::Var(var) => {
                    let index = self.ctx.objects.class(location).unwrap().fields.len();
                    let field = self.ctx.objects.add(Object::Field(Field {
                        name: var.name.clone(),
                        field_type: TypeValue::Any,
                        binding: Binding::Instance,
                        owner: location,
                        index,
                    }));
                    self.ctx.compiler_cache.insert(*item, field);
                    self.ctx.objects.class_mut(location).unwrap().fields.push(field);
                }
                ResolvedNode::Class(nested) => {
                    let nested_object = self.construct_class(*item, &nested)?;
                    self.ctx
                        .objects
                        .class_mut(location)
                        .unwrap()
                        .nested_definitions
                        .push(nested_object);
                }
                // overload groups synthesized for methods construct lazily
                ResolvedNode::OverloadGroup(_) => {}
                _ => {
                    return Err(self.error_at(*item, "this construct may not appear inside a class body"))
                }
            }
        }

        Ok(location)
    }

    /// Class definition: the first base that is a class becomes the base
    /// class, every other base must be a typeclass; field types are
    /// evaluated; members are defined.
    pub(crate) fn define_class(
        &mut self,
        _node: NodeLocation,
        class: &ResolvedClass,
        object: Option<ObjectLocation>,
    ) -> Result<(), ZsError> {
        let location = object.expect("classes always construct an object");

        let mut base: Option<ObjectLocation> = None;
        let mut specifications = Vec::new();
        for base_node in class.bases.iter() {
            let base_type = self.evaluate_type(*base_node)?;
            match base_type {
                TypeValue::Class(base_class) if base.is_none() && specifications.is_empty() => {
                    base = Some(base_class);
                }
                TypeValue::Typeclass(typeclass) => specifications.push(typeclass),
                other => {
                    return Err(self.error_at(
                        *base_node,
                        format!(
                            "base must be a class (first position) or a typeclass, found '{}'",
                            crate::objects::types::type_name(&self.ctx.objects, &other)
                        ),
                    ))
                }
            }
        }
        if let Some(compiled) = self.ctx.objects.class_mut(location) {
            compiled.base = base;
            compiled.specifications = specifications;
        }

        for item in class.items.iter() {
            match self.ctx.nodes.get(*item).clone() {
                ResolvedNode::Var(var) => {
                    let field_type = match var.var_type {
                        Some(type_node) => self.evaluate_type(type_node)?,
                        None => TypeValue::Any,
                    };
                    let field = self
                        .ctx
                        .compiler_cache
                        .get(*item)
                        .expect("fields are cached at construct");
                    if let Object::Field(field) = self.ctx.objects.get_mut(field) {
                        field.field_type = field_type;
                    }
                    self.ctx.compiler_cache.mark_defined(*item);
                }
                ResolvedNode::Function(_) | ResolvedNode::Class(_) => {
                    self.require_definition(*item)?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Instantiates a generic class with concrete type arguments, cached by
    /// origin plus the argument tuple.
    pub(crate) fn instantiate_generic(
        &mut self,
        node: NodeLocation,
        origin: ObjectLocation,
        arguments: Vec<TypeValue>,
    ) -> Result<ObjectLocation, ZsError> {
        let generic_parameters = match self.ctx.objects.class(origin) {
            Some(class) => class.generic_parameters.clone(),
            None => return Err(self.error_at(node, "only classes take generic arguments")),
        };
        if generic_parameters.is_empty() {
            return Err(self.error_at(node, "this class has no generic parameters"));
        }
        if generic_parameters.len() != arguments.len() {
            return Err(self.error_at(
                node,
                format!(
                    "expected {} generic argument(s), found {}",
                    generic_parameters.len(),
                    arguments.len()
                ),
            ));
        }

        let key = (origin, arguments.clone());
        if let Some(cached) = self.ctx.generic_instances.get(&key) {
            return Ok(*cached);
        }

        let mut substitutions = IndexMap::new();
        for (parameter, argument) in generic_parameters.iter().zip(arguments.iter()) {
            substitutions.insert(*parameter, argument.clone());
        }

        let instance = self.ctx.objects.add(Object::GenericInstance(GenericInstance {
            origin,
            arguments,
            substitutions,
        }));
        self.ctx.generic_instances.insert(key, instance);
        Ok(instance)
    }

    /// The instantiated type of one field of a generic instance.
    pub(crate) fn substituted_field_type(&self, instance: ObjectLocation, field: ObjectLocation) -> TypeValue {
        let field_type = self
            .ctx
            .objects
            .field(field)
            .map(|field| field.field_type.clone())
            .unwrap_or(TypeValue::Any);
        match self.ctx.objects.get(instance) {
            Object::GenericInstance(generic) => match &field_type {
                TypeValue::GenericParameter(parameter) => generic
                    .substitutions
                    .get(parameter)
                    .cloned()
                    .unwrap_or(field_type),
                _ => field_type,
            },
            _ => field_type,
        }
    }

    pub(crate) fn construct_typeclass(
        &mut self,
        node: NodeLocation,
        typeclass: &ResolvedTypeclass,
    ) -> Result<ObjectLocation, ZsError> {
        let location = self.ctx.objects.add(Object::Typeclass(Typeclass {
            name: typeclass.name.clone(),
            members: Vec::new(),
            implementations: Vec::new(),
        }));
        self.ctx.compiler_cache.insert(node, location);

        for item in typeclass.items.iter() {
            if let ResolvedNode::Function(function) = self.ctx.nodes.get(*item).clone() {
                let member = self.construct_function(*item, &function, None)?;
                if let Object::Typeclass(typeclass) = self.ctx.objects.get_mut(location) {
                    typeclass.members.push(member);
                }
            }
        }

        Ok(location)
    }

    pub(crate) fn define_typeclass(
        &mut self,
        _node: NodeLocation,
        typeclass: &ResolvedTypeclass,
        _object: Option<ObjectLocation>,
    ) -> Result<(), ZsError> {
        for item in typeclass.items.iter() {
            self.require_definition(*item)?;
        }
        Ok(())
    }

    /// A typeclass implementation: compile its members, check completeness
    /// against the typeclass declaration, and register the implementation.
    pub(crate) fn define_typeclass_impl(
        &mut self,
        node: NodeLocation,
        implementation: &ResolvedTypeclassImpl,
    ) -> Result<(), ZsError> {
        let typeclass_node = implementation
            .typeclass
            .ok_or_else(|| self.error_at(node, format!("'{}' is not a typeclass", implementation.name)))?;
        let typeclass_object = self
            .require_definition(typeclass_node)?
            .ok_or_else(|| self.error_at(node, "typeclass did not produce an object"))?;

        let target = self.evaluate_type(implementation.implemented_type)?;

        let mut members = Vec::new();
        let mut member_names = Vec::new();
        for item in implementation.items.iter() {
            if let Some(member) = self.require_definition(*item)? {
                if let Some(name) = self.ctx.objects.function(member).and_then(|f| f.name.clone()) {
                    member_names.push(name);
                }
                members.push(member);
            }
        }

        // every declared member must be implemented
        let required: Vec<String> = match self.ctx.objects.get(typeclass_object) {
            Object::Typeclass(typeclass) => typeclass
                .members
                .iter()
                .filter_map(|member| self.ctx.objects.function(*member))
                .filter_map(|function| function.name.clone())
                .collect(),
            _ => Vec::new(),
        };
        for name in required.iter() {
            if !member_names.contains(name) {
                return Err(self.error_at(
                    node,
                    format!("implementation of '{}' is missing member '{name}'", implementation.name),
                ));
            }
        }

        if let Object::Typeclass(typeclass) = self.ctx.objects.get_mut(typeclass_object) {
            typeclass.implementations.push(TypeclassImplementation { target, members });
        }
        Ok(())
    }
}
