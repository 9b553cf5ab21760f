//! Overload matching.
//!
//! Candidates are matched in two passes: a *strict* pass over the group's
//! own overloads using type identity, then, only when that finds nothing, a
//! *permissive* pass using assignability that also recurses into parent
//! groups. Exactly one match is required either way.
//!
//! Parameter types that are generic parameters unify against the argument
//! types through a substitution map that must stay consistent across
//! positional and named arguments.

use indexmap::IndexMap;

use crate::vm::Instruction;

use super::{
    types::{are_identical, assignable_to, TypeValue},
    Object, ObjectArena, ObjectLocation,
};

/// One argument at a call site: its compiled instructions and static type.
#[derive(Debug, Clone)]
pub struct Argument {
    pub instructions: Vec<Instruction>,
    pub ty: TypeValue,
}

/// A successful match: the chosen callee and the full argument row in
/// signature order (defaults filled in).
#[derive(Debug, Clone)]
pub struct OverloadMatchResult {
    pub callee: ObjectLocation,
    pub arguments: Vec<Argument>,
    pub substitutions: IndexMap<ObjectLocation, TypeValue>,
}

/// A view over any callable's signature used by the matcher.
struct SignatureView {
    positional: Vec<(TypeValue, Option<Vec<Instruction>>)>,
    named: Vec<(String, TypeValue, Option<Vec<Instruction>>)>,
    has_variadic_positional: bool,
    has_variadic_named: bool,
}

fn signature_view(arena: &ObjectArena, callee: ObjectLocation) -> Option<SignatureView> {
    match arena.get(callee) {
        Object::Function(function) | Object::Method(super::Method { function, .. }) => {
            let mut positional = Vec::new();
            for location in function.signature.positional_parameters.iter() {
                let parameter = arena.parameter(*location)?;
                positional.push((parameter.parameter_type.clone(), parameter.default_value.clone()));
            }
            let mut named = Vec::new();
            for location in function.signature.named_parameters.iter() {
                let parameter = arena.parameter(*location)?;
                named.push((
                    parameter.name.clone(),
                    parameter.parameter_type.clone(),
                    parameter.default_value.clone(),
                ));
            }
            Some(SignatureView {
                positional,
                named,
                has_variadic_positional: function.signature.variadic_positional_parameter.is_some(),
                has_variadic_named: function.signature.variadic_named_parameter.is_some(),
            })
        }
        Object::NativeFunction(native) => Some(SignatureView {
            positional: native
                .parameter_types
                .iter()
                .map(|parameter_type| (parameter_type.clone(), None))
                .collect(),
            named: Vec::new(),
            has_variadic_positional: false,
            has_variadic_named: false,
        }),
        _ => None,
    }
}

fn check_assignability(
    arena: &ObjectArena,
    source: &TypeValue,
    target: &TypeValue,
    strict: bool,
    substitutions: &mut IndexMap<ObjectLocation, TypeValue>,
) -> bool {
    if let TypeValue::GenericParameter(parameter) = target {
        let bound = substitutions
            .entry(*parameter)
            .or_insert_with(|| source.clone())
            .clone();
        return if strict {
            are_identical(source, &bound)
        } else {
            assignable_to(arena, source, &bound)
        };
    }
    if strict {
        are_identical(source, target)
    } else {
        assignable_to(arena, source, target)
    }
}

/// Matches one callable against a call site.
///
/// Returns `None` when the candidate does not fit. Variadic collection is
/// not implemented: a call with more arguments than declared slots never
/// matches.
pub fn match_callable(
    arena: &ObjectArena,
    callee: ObjectLocation,
    arguments: &[Argument],
    keyword_arguments: &[(String, Argument)],
    strict: bool,
    type_mappings: Option<&IndexMap<ObjectLocation, TypeValue>>,
) -> Option<OverloadMatchResult> {
    let signature = signature_view(arena, callee)?;

    if arguments.len() > signature.positional.len() && !signature.has_variadic_positional {
        return None;
    }
    if keyword_arguments.len() > signature.named.len() && !signature.has_variadic_named {
        return None;
    }
    if arguments.len() > signature.positional.len() || keyword_arguments.len() > signature.named.len() {
        log::debug!("variadic collection is not implemented; rejecting candidate");
        return None;
    }

    let mut substitutions = type_mappings.cloned().unwrap_or_default();
    let mut matched_positional = Vec::new();

    for (argument, (parameter_type, _)) in arguments.iter().zip(signature.positional.iter()) {
        if !check_assignability(arena, &argument.ty, parameter_type, strict, &mut substitutions) {
            return None;
        }
        matched_positional.push(argument.clone());
    }

    // missing positional parameters fall back to defaults
    for (parameter_type, default) in signature.positional.iter().skip(arguments.len()) {
        match default {
            Some(instructions) => matched_positional.push(Argument {
                instructions: instructions.clone(),
                ty: parameter_type.clone(),
            }),
            None => return None,
        }
    }

    let mut matched_named: IndexMap<&str, Argument> = IndexMap::new();
    for (name, argument) in keyword_arguments.iter() {
        let parameter = signature
            .named
            .iter()
            .find(|(parameter_name, _, _)| parameter_name == name)?;
        if !check_assignability(arena, &argument.ty, &parameter.1, strict, &mut substitutions) {
            return None;
        }
        matched_named.insert(parameter.0.as_str(), argument.clone());
    }

    let mut arguments_row = matched_positional;
    for (name, parameter_type, default) in signature.named.iter() {
        match matched_named.shift_remove(name.as_str()) {
            Some(argument) => arguments_row.push(argument),
            None => match default {
                Some(instructions) => arguments_row.push(Argument {
                    instructions: instructions.clone(),
                    ty: parameter_type.clone(),
                }),
                None => return None,
            },
        }
    }

    Some(OverloadMatchResult {
        callee,
        arguments: arguments_row,
        substitutions,
    })
}

/// Matching failure: how many candidates fit (zero or more than one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMatchFailure {
    pub matches: usize,
}

/// Resolves a call against an overload group.
///
/// The strict pass considers only the group's own overloads; the permissive
/// retry also walks parent groups. Overload order never affects the result:
/// all candidates of a pass are tried and exactly one must fit.
pub fn match_group(
    arena: &ObjectArena,
    group: ObjectLocation,
    arguments: &[Argument],
    keyword_arguments: &[(String, Argument)],
    type_mappings: Option<&IndexMap<ObjectLocation, TypeValue>>,
) -> Result<OverloadMatchResult, GroupMatchFailure> {
    let own_overloads = match arena.group(group) {
        Some(group) => group.overloads.clone(),
        None => return Err(GroupMatchFailure { matches: 0 }),
    };

    let strict_matches: Vec<OverloadMatchResult> = own_overloads
        .iter()
        .filter_map(|overload| {
            match_callable(arena, *overload, arguments, keyword_arguments, true, type_mappings)
        })
        .collect();

    if strict_matches.len() == 1 {
        return Ok(strict_matches.into_iter().next().unwrap());
    }
    if strict_matches.len() > 1 {
        return Err(GroupMatchFailure { matches: strict_matches.len() });
    }

    // permissive retry, walking parent groups
    let mut candidates = Vec::new();
    let mut current = Some(group);
    while let Some(location) = current {
        match arena.group(location) {
            Some(group) => {
                candidates.extend(group.overloads.iter().copied());
                current = group.parent;
            }
            None => break,
        }
    }

    let permissive_matches: Vec<OverloadMatchResult> = candidates
        .iter()
        .filter_map(|overload| {
            match_callable(arena, *overload, arguments, keyword_arguments, false, type_mappings)
        })
        .collect();

    if permissive_matches.len() == 1 {
        Ok(permissive_matches.into_iter().next().unwrap())
    } else {
        Err(GroupMatchFailure { matches: permissive_matches.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{
        Function, FunctionSignature, IntKind, NativeFunction, OverloadGroup, Parameter,
    };

    fn int32() -> TypeValue {
        TypeValue::Int(IntKind::I32)
    }

    fn argument(ty: TypeValue) -> Argument {
        Argument { instructions: vec![], ty }
    }

    fn add_function(arena: &mut ObjectArena, name: &str, parameters: Vec<TypeValue>, ret: TypeValue) -> ObjectLocation {
        let mut locations = Vec::new();
        for (index, parameter_type) in parameters.into_iter().enumerate() {
            let mut parameter = Parameter::new(format!("p{index}"), index);
            parameter.parameter_type = parameter_type;
            locations.push(arena.add(Object::Parameter(parameter)));
        }
        let mut function = Function::new(Some(name.to_string()));
        function.signature = FunctionSignature {
            positional_parameters: locations,
            return_type: ret,
            ..Default::default()
        };
        arena.add(Object::Function(function))
    }

    #[test]
    fn strict_match_wins_over_widening() {
        let mut arena = ObjectArena::new();
        let narrow = add_function(&mut arena, "f", vec![int32()], int32());
        let wide = add_function(&mut arena, "f", vec![TypeValue::Int(IntKind::I64)], int32());
        let group = arena.add(Object::OverloadGroup(OverloadGroup {
            name: "f".into(),
            parent: None,
            overloads: vec![wide, narrow],
        }));

        let result = match_group(&arena, group, &[argument(int32())], &[], None).unwrap();
        assert_eq!(result.callee, narrow);
    }

    #[test]
    fn overload_choice_is_declaration_order_independent() {
        for flipped in [false, true] {
            let mut arena = ObjectArena::new();
            let for_int = add_function(&mut arena, "f", vec![int32()], int32());
            let for_string = add_function(&mut arena, "f", vec![TypeValue::String], TypeValue::String);
            let overloads = if flipped { vec![for_string, for_int] } else { vec![for_int, for_string] };
            let group = arena.add(Object::OverloadGroup(OverloadGroup {
                name: "f".into(),
                parent: None,
                overloads,
            }));

            let result = match_group(&arena, group, &[argument(TypeValue::String)], &[], None).unwrap();
            assert_eq!(result.callee, for_string);
        }
    }

    #[test]
    fn permissive_pass_reaches_parent_groups() {
        let mut arena = ObjectArena::new();
        let in_parent = add_function(&mut arena, "f", vec![TypeValue::Any], TypeValue::Any);
        let parent = arena.add(Object::OverloadGroup(OverloadGroup {
            name: "f".into(),
            parent: None,
            overloads: vec![in_parent],
        }));
        let child = arena.add(Object::OverloadGroup(OverloadGroup {
            name: "f".into(),
            parent: Some(parent),
            overloads: vec![],
        }));

        let result = match_group(&arena, child, &[argument(TypeValue::Bool)], &[], None).unwrap();
        assert_eq!(result.callee, in_parent);
    }

    #[test]
    fn zero_and_many_matches_fail_with_counts() {
        let mut arena = ObjectArena::new();
        let first = add_function(&mut arena, "f", vec![TypeValue::Any], TypeValue::Any);
        let second = add_function(&mut arena, "f", vec![TypeValue::Any], TypeValue::Any);
        let group = arena.add(Object::OverloadGroup(OverloadGroup {
            name: "f".into(),
            parent: None,
            overloads: vec![first, second],
        }));

        let failure = match_group(&arena, group, &[argument(TypeValue::Bool)], &[], None).unwrap_err();
        assert_eq!(failure.matches, 2);

        let empty = arena.add(Object::OverloadGroup(OverloadGroup {
            name: "g".into(),
            parent: None,
            overloads: vec![],
        }));
        let failure = match_group(&arena, empty, &[argument(TypeValue::Bool)], &[], None).unwrap_err();
        assert_eq!(failure.matches, 0);
    }

    #[test]
    fn generic_substitution_must_stay_consistent() {
        let mut arena = ObjectArena::new();
        let generic = arena.add(Object::GenericParameter(crate::objects::GenericParameter {
            name: "T".into(),
        }));
        let callee = add_function(
            &mut arena,
            "pair",
            vec![TypeValue::GenericParameter(generic), TypeValue::GenericParameter(generic)],
            TypeValue::Unit,
        );

        // both occurrences bind to Int32
        let result = match_callable(
            &arena,
            callee,
            &[argument(int32()), argument(int32())],
            &[],
            true,
            None,
        )
        .unwrap();
        assert_eq!(result.substitutions.get(&generic), Some(&int32()));

        // an inconsistent second argument is rejected
        assert!(match_callable(
            &arena,
            callee,
            &[argument(int32()), argument(TypeValue::String)],
            &[],
            true,
            None,
        )
        .is_none());
    }

    #[test]
    fn default_values_fill_missing_parameters() {
        let mut arena = ObjectArena::new();
        let mut required = Parameter::new("x", 0);
        required.parameter_type = int32();
        let required = arena.add(Object::Parameter(required));
        let mut optional = Parameter::new("y", 1);
        optional.parameter_type = int32();
        optional.default_value = Some(vec![Instruction::LoadObject(crate::objects::Value::I32(7))]);
        let optional = arena.add(Object::Parameter(optional));

        let mut function = Function::new(Some("f".into()));
        function.signature = FunctionSignature {
            positional_parameters: vec![required, optional],
            return_type: TypeValue::Unit,
            ..Default::default()
        };
        let callee = arena.add(Object::Function(function));

        let result = match_callable(&arena, callee, &[argument(int32())], &[], true, None).unwrap();
        assert_eq!(result.arguments.len(), 2);
        assert_eq!(
            result.arguments[1].instructions,
            vec![Instruction::LoadObject(crate::objects::Value::I32(7))]
        );
    }

    #[test]
    fn native_functions_match_like_functions() {
        let mut arena = ObjectArena::new();
        let native = arena.add(Object::NativeFunction(NativeFunction {
            name: "print".into(),
            parameter_types: vec![TypeValue::Any],
            return_type: TypeValue::Void,
            handler: |_| Ok(crate::objects::Value::Unit),
        }));
        let group = arena.add(Object::OverloadGroup(OverloadGroup {
            name: "print".into(),
            parent: None,
            overloads: vec![native],
        }));

        let result = match_group(&arena, group, &[argument(TypeValue::String)], &[], None).unwrap();
        assert_eq!(result.callee, native);
    }
}
