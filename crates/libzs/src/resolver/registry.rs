//! The registry pass: resolved-node creation and scope population.
//!
//! Every declaration gets a resolved node pushed into the current scope
//! under its declared name, with a fresh child scope where the construct
//! owns one. Named functions synthesize or extend an overload group. Literal
//! text is decoded into typed VM values here.

use std::rc::Rc;

use crate::{
    ast::{Ast, AstKind, LiteralKind},
    builtins,
    context::ScopeValue,
    error::{CodeCompilation, ZsError},
    objects::{Value},
    resolved::{
        NodeLocation, ResolvedBinary, ResolvedBlock, ResolvedBreak, ResolvedCall, ResolvedClass,
        ResolvedContinue, ResolvedExport, ResolvedExportItems, ResolvedExpressionStatement,
        ResolvedFunction, ResolvedFunctionBody, ResolvedGenericParameter, ResolvedIdentifier,
        ResolvedIf, ResolvedImport, ResolvedImportedName, ResolvedMemberAccess, ResolvedModule,
        ResolvedNode, ResolvedObject, ResolvedOverloadGroup, ResolvedParameter, ResolvedReturn,
        ResolvedSet, ResolvedTypeclass, ResolvedTypeclassImpl, ResolvedUnary, ResolvedVar,
        ResolvedWhen, ResolvedWhile, ResolvedAssign,
    },
    span::Span,
};

use super::Resolver;

impl Resolver<'_> {
    /// Registers one AST node, returning its resolved node.
    pub(crate) fn register(&mut self, ast: &Rc<Ast>) -> Result<NodeLocation, ZsError> {
        match &ast.kind {
            AstKind::Literal(literal) => {
                let value = decode_literal(literal.kind, &literal.text, &ast.span)?;
                Ok(self.add_node(ResolvedNode::Object(ResolvedObject {
                    value,
                    span: Some(ast.span.clone()),
                })))
            }

            AstKind::Identifier(identifier) => Ok(self.add_node(ResolvedNode::Identifier(
                ResolvedIdentifier { ast: ast.clone(), name: identifier.name.clone() },
            ))),

            AstKind::MemberAccess(access) => {
                let object = self.register(&access.object)?;
                Ok(self.add_node(ResolvedNode::MemberAccess(ResolvedMemberAccess {
                    ast: ast.clone(),
                    object,
                    member: access.member.name.clone(),
                    member_span: access.member.span.clone(),
                })))
            }

            AstKind::Call(call) => {
                let callable = self.register(&call.callable)?;
                let mut arguments = Vec::new();
                for argument in call.arguments.iter() {
                    arguments.push(self.register(argument)?);
                }
                let mut keyword_arguments = Vec::new();
                for (name, argument) in call.keyword_arguments.iter() {
                    keyword_arguments.push((name.name.clone(), self.register(argument)?));
                }
                Ok(self.add_node(ResolvedNode::Call(ResolvedCall {
                    ast: ast.clone(),
                    callable,
                    bracket: call.bracket,
                    arguments,
                    keyword_arguments,
                })))
            }

            AstKind::Assign(assign) => {
                let target = self.register(&assign.target)?;
                let value = self.register(&assign.value)?;
                Ok(self.add_node(ResolvedNode::Assign(ResolvedAssign {
                    ast: ast.clone(),
                    target,
                    value,
                })))
            }

            AstKind::Binary(binary) => {
                let left = self.register(&binary.left)?;
                let right = self.register(&binary.right)?;
                Ok(self.add_node(ResolvedNode::Binary(ResolvedBinary {
                    ast: ast.clone(),
                    operator: binary.operator.clone(),
                    operator_span: binary.operator_span.clone(),
                    left,
                    right,
                })))
            }

            AstKind::Unary(unary) => {
                let operand = self.register(&unary.operand)?;
                Ok(self.add_node(ResolvedNode::Unary(ResolvedUnary {
                    ast: ast.clone(),
                    operator: unary.operator.clone(),
                    operator_span: unary.operator_span.clone(),
                    operand,
                })))
            }

            AstKind::Block(block) => {
                let mut body = Vec::new();
                for statement in block.statements.iter() {
                    body.push(self.register(statement)?);
                }
                Ok(self.add_node(ResolvedNode::Block(ResolvedBlock { ast: ast.clone(), body })))
            }

            AstKind::If(if_ast) => {
                let condition = self.register(&if_ast.condition)?;
                let if_body = self.register(&if_ast.if_true)?;
                let else_body = match &if_ast.if_false {
                    Some(if_false) => Some(self.register(if_false)?),
                    None => None,
                };
                Ok(self.add_node(ResolvedNode::If(ResolvedIf {
                    ast: ast.clone(),
                    condition,
                    if_body,
                    else_body,
                })))
            }

            AstKind::While(while_ast) => {
                let scope = self.create_child_scope();
                let location = self.add_node(ResolvedNode::While(ResolvedWhile {
                    ast: ast.clone(),
                    label: while_ast.label.as_ref().map(|label| label.name.clone()),
                    condition: NodeLocation(usize::MAX),
                    body: NodeLocation(usize::MAX),
                    else_body: None,
                    scope,
                }));

                if let Some(label) = &while_ast.label {
                    if let Err(error) = self.ctx.scopes.create_name(scope, &label.name, ScopeValue::Node(location)) {
                        return Err(self.scope_error(error, &label.span));
                    }
                }

                let (condition, body, else_body) = self.in_scope(scope, |resolver| {
                    let condition = resolver.register(&while_ast.condition)?;
                    let body = resolver.register(&while_ast.body)?;
                    let else_body = match &while_ast.else_body {
                        Some(else_body) => Some(resolver.register(else_body)?),
                        None => None,
                    };
                    Ok::<_, ZsError>((condition, body, else_body))
                })?;

                if let ResolvedNode::While(node) = self.ctx.nodes.get_mut(location) {
                    node.condition = condition;
                    node.body = body;
                    node.else_body = else_body;
                }
                Ok(location)
            }

            AstKind::When(when) => {
                let subject = self.register(&when.subject)?;
                let mut cases = Vec::new();
                for case in when.cases.iter() {
                    let expression = self.register(&case.expression)?;
                    let body = self.register(&case.body)?;
                    cases.push((expression, body));
                }
                let else_body = match &when.else_body {
                    Some(else_body) => Some(self.register(else_body)?),
                    None => None,
                };
                Ok(self.add_node(ResolvedNode::When(ResolvedWhen {
                    ast: ast.clone(),
                    label: when.label.as_ref().map(|label| label.name.clone()),
                    subject,
                    cases,
                    else_body,
                })))
            }

            AstKind::Break(break_ast) => Ok(self.add_node(ResolvedNode::Break(ResolvedBreak {
                ast: ast.clone(),
                label: break_ast.label.as_ref().map(|label| label.name.clone()),
            }))),

            AstKind::Continue(continue_ast) => Ok(self.add_node(ResolvedNode::Continue(
                ResolvedContinue {
                    ast: ast.clone(),
                    label: continue_ast.label.as_ref().map(|label| label.name.clone()),
                },
            ))),

            AstKind::Return(return_ast) => {
                let expression = match &return_ast.expression {
                    Some(expression) => Some(self.register(expression)?),
                    None => None,
                };
                Ok(self.add_node(ResolvedNode::Return(ResolvedReturn { ast: ast.clone(), expression })))
            }

            AstKind::Var(var) => {
                let var_type = match &var.var_type {
                    Some(var_type) => Some(self.register(var_type)?),
                    None => None,
                };
                let initializer = match &var.initializer {
                    Some(initializer) => Some(self.register(initializer)?),
                    None => None,
                };
                let location = self.add_node(ResolvedNode::Var(ResolvedVar {
                    ast: ast.clone(),
                    name: var.name.name.clone(),
                    var_type,
                    initializer,
                }));
                if let Err(error) =
                    self.ctx.scopes.create_name(self.current_scope, &var.name.name, ScopeValue::Node(location))
                {
                    return Err(self.scope_error(error, &var.name.span));
                }
                Ok(location)
            }

            AstKind::Set(set) => {
                let value = self.register(&set.value)?;
                Ok(self.add_node(ResolvedNode::Set(ResolvedSet {
                    ast: ast.clone(),
                    name: set.name.name.clone(),
                    target: None,
                    value,
                })))
            }

            AstKind::Parameter(parameter) => {
                let parameter_type = match &parameter.parameter_type {
                    Some(parameter_type) => Some(self.register(parameter_type)?),
                    None => None,
                };
                let initializer = match &parameter.default_value {
                    Some(default_value) => Some(self.register(default_value)?),
                    None => None,
                };
                let location = self.add_node(ResolvedNode::Parameter(ResolvedParameter {
                    ast: ast.clone(),
                    name: parameter.name.name.clone(),
                    alias: parameter.alias.as_ref().map(|alias| alias.name.clone()),
                    parameter_type,
                    initializer,
                }));

                let visible = parameter
                    .alias
                    .as_ref()
                    .map(|alias| alias.name.clone())
                    .unwrap_or_else(|| parameter.name.name.clone());
                if let Err(error) =
                    self.ctx.scopes.create_name(self.current_scope, &visible, ScopeValue::Node(location))
                {
                    return Err(self.scope_error(error, &parameter.name.span));
                }
                Ok(location)
            }

            AstKind::Function(_) => self.register_function(ast),

            AstKind::Class(_) => self.register_class(ast),

            AstKind::Typeclass(typeclass) => {
                let scope = self.create_child_scope();
                let location = self.add_node(ResolvedNode::Typeclass(ResolvedTypeclass {
                    ast: ast.clone(),
                    name: typeclass.name.name.clone(),
                    items: Vec::new(),
                    scope,
                }));
                if let Err(error) =
                    self.ctx.scopes.create_name(self.current_scope, &typeclass.name.name, ScopeValue::Node(location))
                {
                    return Err(self.scope_error(error, &typeclass.name.span));
                }

                let items = self.in_scope(scope, |resolver| {
                    let mut items = Vec::new();
                    for item in typeclass.items.iter() {
                        items.push(resolver.register(item)?);
                    }
                    Ok::<_, ZsError>(items)
                })?;

                if let ResolvedNode::Typeclass(node) = self.ctx.nodes.get_mut(location) {
                    node.items = items;
                }
                Ok(location)
            }

            AstKind::TypeclassImpl(implementation) => {
                let implemented_type = self.register(&implementation.implemented_type)?;
                let scope = self.create_child_scope();
                let location = self.add_node(ResolvedNode::TypeclassImpl(ResolvedTypeclassImpl {
                    ast: ast.clone(),
                    name: implementation.name.name.clone(),
                    typeclass: None,
                    implemented_type,
                    items: Vec::new(),
                    scope,
                }));

                let items = self.in_scope(scope, |resolver| {
                    let mut items = Vec::new();
                    for item in implementation.items.iter() {
                        items.push(resolver.register(item)?);
                    }
                    Ok::<_, ZsError>(items)
                })?;

                if let ResolvedNode::TypeclassImpl(node) = self.ctx.nodes.get_mut(location) {
                    node.items = items;
                }
                Ok(location)
            }

            AstKind::Module(module) => {
                let scope = self.create_child_scope();
                let location = self.add_node(ResolvedNode::Module(ResolvedModule {
                    ast: ast.clone(),
                    name: module.name.as_ref().map(|name| name.name.clone()),
                    items: Vec::new(),
                    scope,
                }));
                if let Some(name) = &module.name {
                    if let Err(error) =
                        self.ctx.scopes.create_name(self.current_scope, &name.name, ScopeValue::Node(location))
                    {
                        return Err(self.scope_error(error, &name.span));
                    }
                }

                let items = self.in_scope(scope, |resolver| {
                    let mut items = Vec::new();
                    for item in module.items.iter() {
                        items.push(resolver.register(item)?);
                    }
                    Ok::<_, ZsError>(items)
                })?;

                if let ResolvedNode::Module(node) = self.ctx.nodes.get_mut(location) {
                    node.items = items;
                }
                Ok(location)
            }

            AstKind::Import(_) => self.register_import(ast),

            AstKind::Export(export) => {
                let source = match &export.source {
                    Some(source) => Some(self.register(source)?),
                    None => None,
                };
                let items = match &export.items {
                    crate::ast::ExportItems::All { alias } => {
                        if alias.is_some() {
                            return Err(ZsError::CodeCompilation(
                                CodeCompilation {
                                    message: "'export * as ...' is not allowed".to_string(),
                                    position: ast.span.position.clone().into(),
                                    code: (&ast.span.file).into(),
                                }
                                .into(),
                            ));
                        }
                        ResolvedExportItems::All
                    }
                    crate::ast::ExportItems::Named(names) => ResolvedExportItems::Named(
                        names
                            .iter()
                            .map(|name| {
                                (
                                    name.name.name.clone(),
                                    name.alias
                                        .as_ref()
                                        .map(|alias| alias.name.clone())
                                        .unwrap_or_else(|| name.name.name.clone()),
                                )
                            })
                            .collect(),
                    ),
                    crate::ast::ExportItems::Declaration(declaration) => {
                        ResolvedExportItems::Declaration(self.register(declaration)?)
                    }
                    crate::ast::ExportItems::Name(name) => ResolvedExportItems::Name(name.name.clone()),
                };
                Ok(self.add_node(ResolvedNode::Export(ResolvedExport { ast: ast.clone(), items, source })))
            }

            AstKind::ExpressionStatement(statement) => {
                let expression = self.register(&statement.expression)?;
                Ok(self.add_node(ResolvedNode::ExpressionStatement(ResolvedExpressionStatement {
                    ast: ast.clone(),
                    expression,
                })))
            }
        }
    }

    /// Function registration: overload-group synthesis, scope creation,
    /// parameters and return type. The body is left for the linker.
    fn register_function(&mut self, ast: &Rc<Ast>) -> Result<NodeLocation, ZsError> {
        let function = match &ast.kind {
            AstKind::Function(function) => function,
            _ => unreachable!(),
        };

        let scope = self.create_child_scope();
        let location = self.add_node(ResolvedNode::Function(ResolvedFunction {
            ast: ast.clone(),
            name: function.name.as_ref().map(|name| name.name.clone()),
            generic_parameters: Vec::new(),
            positional_parameters: Vec::new(),
            named_parameters: Vec::new(),
            variadic_positional_parameter: None,
            variadic_named_parameter: None,
            return_type: None,
            body: None,
            scope,
            owner_class: None,
        }));

        // named functions join (or start) the overload group of their name
        if let Some(name) = &function.name {
            let existing = self
                .ctx
                .scopes
                .lookup_name(self.current_scope, &name.name, false)
                .cloned();
            match existing {
                None => {
                    let group = self.add_node(ResolvedNode::OverloadGroup(ResolvedOverloadGroup {
                        name: name.name.clone(),
                        parent: None,
                        overloads: vec![location],
                        defining_scope: self.current_scope,
                    }));
                    self.inject(group);
                    if let Err(error) =
                        self.ctx.scopes.create_name(self.current_scope, &name.name, ScopeValue::Node(group))
                    {
                        return Err(self.scope_error(error, &name.span));
                    }
                }
                Some(ScopeValue::Node(group_location)) => {
                    match self.ctx.nodes.get_mut(group_location) {
                        ResolvedNode::OverloadGroup(group) => group.overloads.push(location),
                        _ => {
                            let span = &name.span;
                            return Err(self.scope_error(
                                crate::scope::ScopeError::NameAlreadyBound { name: name.name.clone() },
                                span,
                            ));
                        }
                    }
                }
                Some(ScopeValue::Object(_)) => {
                    return Err(self.scope_error(
                        crate::scope::ScopeError::NameAlreadyBound { name: name.name.clone() },
                        &name.span,
                    ));
                }
            }
        }

        let details = self.in_scope(scope, |resolver| {
            let mut generic_parameters = Vec::new();
            if let Some(generics) = &function.generic_parameters {
                for generic in generics.iter() {
                    let parameter = resolver.add_node(ResolvedNode::GenericParameter(
                        ResolvedGenericParameter { name: generic.name.clone(), span: generic.span.clone() },
                    ));
                    if let Err(error) =
                        resolver.ctx.scopes.create_name(scope, &generic.name, ScopeValue::Node(parameter))
                    {
                        return Err(resolver.scope_error(error, &generic.span));
                    }
                    generic_parameters.push(parameter);
                }
            }

            let mut positional_parameters = Vec::new();
            for parameter in function.positional_parameters.iter() {
                positional_parameters.push(resolver.register(parameter)?);
            }
            let mut named_parameters = Vec::new();
            for parameter in function.named_parameters.iter() {
                named_parameters.push(resolver.register(parameter)?);
            }
            let variadic_positional_parameter = match &function.variadic_positional_parameter {
                Some(parameter) => Some(resolver.register(parameter)?),
                None => None,
            };
            let variadic_named_parameter = match &function.variadic_named_parameter {
                Some(parameter) => Some(resolver.register(parameter)?),
                None => None,
            };
            let return_type = match &function.return_type {
                Some(return_type) => Some(resolver.register(return_type)?),
                None => None,
            };

            Ok::<_, ZsError>((
                generic_parameters,
                positional_parameters,
                named_parameters,
                variadic_positional_parameter,
                variadic_named_parameter,
                return_type,
            ))
        })?;

        let body = function.body.as_ref().map(|_| {
            self.add_node(ResolvedNode::FunctionBody(ResolvedFunctionBody {
                function: location,
                instructions: None,
            }))
        });

        if let ResolvedNode::Function(node) = self.ctx.nodes.get_mut(location) {
            node.generic_parameters = details.0;
            node.positional_parameters = details.1;
            node.named_parameters = details.2;
            node.variadic_positional_parameter = details.3;
            node.variadic_named_parameter = details.4;
            node.return_type = details.5;
            node.body = body;
        }
        Ok(location)
    }

    /// Class registration. Generic parameters live in a dedicated signature
    /// scope that wraps the body scope, so member types see the generics
    /// while base resolution does not see sibling members.
    fn register_class(&mut self, ast: &Rc<Ast>) -> Result<NodeLocation, ZsError> {
        let class = match &ast.kind {
            AstKind::Class(class) => class,
            _ => unreachable!(),
        };

        let signature_scope = self.create_child_scope();
        let body_scope = self.ctx.scopes.create_scope(Some(signature_scope));

        let location = self.add_node(ResolvedNode::Class(ResolvedClass {
            ast: ast.clone(),
            name: class.name.as_ref().map(|name| name.name.clone()),
            generic_parameters: Vec::new(),
            bases: Vec::new(),
            items: Vec::new(),
            signature_scope,
            body_scope,
        }));

        if let Some(name) = &class.name {
            if let Err(error) =
                self.ctx.scopes.create_name(self.current_scope, &name.name, ScopeValue::Node(location))
            {
                return Err(self.scope_error(error, &name.span));
            }
        }

        // bases are plain expressions; the linker resolves them inside the
        // signature scope
        let mut bases = Vec::new();
        for base in class.bases.iter() {
            bases.push(self.register(base)?);
        }

        let mut generic_parameters = Vec::new();
        if let Some(generics) = &class.generic_parameters {
            for generic in generics.iter() {
                let parameter = self.add_node(ResolvedNode::GenericParameter(ResolvedGenericParameter {
                    name: generic.name.clone(),
                    span: generic.span.clone(),
                }));
                if let Err(error) =
                    self.ctx.scopes.create_name(signature_scope, &generic.name, ScopeValue::Node(parameter))
                {
                    return Err(self.scope_error(error, &generic.span));
                }
                generic_parameters.push(parameter);
            }
        }

        let items = self.in_scope(body_scope, |resolver| {
            let mut items = Vec::new();
            for item in class.items.iter() {
                let item_location = resolver.register(item)?;
                if matches!(resolver.ctx.nodes.get(item_location), ResolvedNode::Function(_)) {
                    resolver.attach_receiver(item_location, location, &item.span)?;
                }
                items.push(item_location);
            }
            Ok::<_, ZsError>(items)
        })?;

        if let ResolvedNode::Class(node) = self.ctx.nodes.get_mut(location) {
            node.generic_parameters = generic_parameters;
            node.bases = bases;
            node.items = items;
        }
        Ok(location)
    }

    /// Makes a class-member function a method: prepends the implicit `this`
    /// receiver parameter, typed as the owning class.
    fn attach_receiver(
        &mut self,
        function: NodeLocation,
        class: NodeLocation,
        span: &Span,
    ) -> Result<(), ZsError> {
        let (function_ast, function_scope) = match self.ctx.nodes.get(function) {
            ResolvedNode::Function(node) => (node.ast.clone(), node.scope),
            _ => return Ok(()),
        };

        let receiver = self.add_node(ResolvedNode::Parameter(ResolvedParameter {
            ast: function_ast,
            name: "this".to_string(),
            alias: None,
            parameter_type: Some(class),
            initializer: None,
        }));
        if let Err(error) = self.ctx.scopes.create_name(function_scope, "this", ScopeValue::Node(receiver)) {
            return Err(self.scope_error(error, span));
        }

        if let ResolvedNode::Function(node) = self.ctx.nodes.get_mut(function) {
            node.positional_parameters.insert(0, receiver);
            node.owner_class = Some(class);
        }
        Ok(())
    }

    fn register_import(&mut self, ast: &Rc<Ast>) -> Result<NodeLocation, ZsError> {
        let import = match &ast.kind {
            AstKind::Import(import) => import,
            _ => unreachable!(),
        };

        let source = self.register(&import.source)?;
        let location = self.add_node(ResolvedNode::Import(ResolvedImport {
            ast: ast.clone(),
            source,
            imported_names: Vec::new(),
            import_all: matches!(import.names, crate::ast::ImportNames::All { .. }),
        }));

        let mut imported_names = Vec::new();
        if let crate::ast::ImportNames::Named(names) = &import.names {
            for name in names.iter() {
                let visible = name
                    .alias
                    .as_ref()
                    .map(|alias| alias.name.clone())
                    .unwrap_or_else(|| name.name.name.clone());
                let imported = self.add_node(ResolvedNode::ImportedName(ResolvedImportedName {
                    name: visible.clone(),
                    origin: name.name.name.clone(),
                    span: name.name.span.clone(),
                    import: location,
                }));
                // referred, not defined: imports are not re-exported
                if let Err(error) =
                    self.ctx.scopes.refer_name(self.current_scope, &visible, ScopeValue::Node(imported))
                {
                    return Err(self.scope_error(error, &name.name.span));
                }
                imported_names.push(imported);
            }
        }

        if let ResolvedNode::Import(node) = self.ctx.nodes.get_mut(location) {
            node.imported_names = imported_names;
        }
        Ok(location)
    }
}

/// Decodes a literal lexeme into a typed VM value.
///
/// Integer suffixes select the exact numeric kind; a bare decimal defaults
/// to `Int32` and a bare real to `Float32`.
pub(crate) fn decode_literal(kind: LiteralKind, text: &str, span: &Span) -> Result<Value, ZsError> {
    let error = |message: String| {
        ZsError::CodeCompilation(
            CodeCompilation {
                message,
                position: span.position.clone().into(),
                code: (&span.file).into(),
            }
            .into(),
        )
    };

    match kind {
        LiteralKind::True => Ok(Value::Bool(true)),
        LiteralKind::False => Ok(Value::Bool(false)),
        LiteralKind::Null => Ok(Value::Null),
        LiteralKind::Unit => Ok(Value::Unit),
        LiteralKind::String => decode_string(&text[1..text.len() - 1]).map(|s| Value::String(s.into())).map_err(error),
        LiteralKind::Character => decode_string(&text[1..text.len() - 1]).map(|s| Value::String(s.into())).map_err(error),
        LiteralKind::Hex => {
            let digits = text.trim_start_matches("0x").replace('_', "");
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| error(format!("invalid hex literal '{text}'")))?;
            match i32::try_from(value) {
                Ok(value) => Ok(Value::I32(value)),
                Err(_) => Ok(Value::I64(value)),
            }
        }
        LiteralKind::Decimal => decode_decimal(text).map_err(error),
        LiteralKind::Real => decode_real(text).map_err(error),
    }
}

fn decode_string(text: &str) -> Result<String, String> {
    let mut result = String::new();
    let mut characters = text.chars();
    while let Some(character) = characters.next() {
        if character != '\\' {
            result.push(character);
            continue;
        }
        match characters.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            Some(other) => result.push(other),
            None => return Err("dangling escape at end of literal".to_string()),
        }
    }
    Ok(result)
}

fn decode_decimal(text: &str) -> Result<Value, String> {
    let text = text.replace('_', "");

    if let Some(digits) = text.strip_suffix('I') {
        return builtins::parse_big_int(digits).ok_or_else(|| format!("invalid integer literal '{text}'"));
    }
    if let Some(digits) = text.strip_suffix('U') {
        return digits
            .parse::<num_bigint::BigUint>()
            .map(Value::UInt)
            .map_err(|_| format!("invalid integer literal '{text}'"));
    }

    let split_suffix = |marker: char| -> Option<(String, String)> {
        text.find(marker)
            .map(|at| (text[..at].to_string(), text[at + 1..].to_string()))
    };

    if let Some((digits, width)) = split_suffix('i') {
        return match width.as_str() {
            "8" => digits.parse::<i8>().map(Value::I8).map_err(|e| e.to_string()),
            "16" => digits.parse::<i16>().map(Value::I16).map_err(|e| e.to_string()),
            "32" => digits.parse::<i32>().map(Value::I32).map_err(|e| e.to_string()),
            "64" => digits.parse::<i64>().map(Value::I64).map_err(|e| e.to_string()),
            _ => Err(format!("unknown integer width 'i{width}'")),
        };
    }
    if let Some((digits, width)) = split_suffix('u') {
        return match width.as_str() {
            "8" => digits.parse::<u8>().map(Value::U8).map_err(|e| e.to_string()),
            "16" => digits.parse::<u16>().map(Value::U16).map_err(|e| e.to_string()),
            "32" => digits.parse::<u32>().map(Value::U32).map_err(|e| e.to_string()),
            "64" => digits.parse::<u64>().map(Value::U64).map_err(|e| e.to_string()),
            _ => Err(format!("unknown integer width 'u{width}'")),
        };
    }
    if let Some((digits, width)) = split_suffix('f') {
        return match width.as_str() {
            "32" => digits.parse::<f32>().map(Value::F32).map_err(|e| e.to_string()),
            "64" => digits.parse::<f64>().map(Value::F64).map_err(|e| e.to_string()),
            _ => Err(format!("unknown float width 'f{width}'")),
        };
    }

    text.parse::<i32>()
        .map(Value::I32)
        .map_err(|_| format!("integer literal '{text}' does not fit in Int32"))
}

fn decode_real(text: &str) -> Result<Value, String> {
    let text = text.replace('_', "");
    if let Some(at) = text.find('f') {
        let digits = &text[..at];
        return match &text[at + 1..] {
            "32" => digits.parse::<f32>().map(Value::F32).map_err(|e| e.to_string()),
            "64" => digits.parse::<f64>().map(Value::F64).map_err(|e| e.to_string()),
            width => Err(format!("unknown float width 'f{width}'")),
        };
    }
    text.parse::<f32>()
        .map(Value::F32)
        .map_err(|_| format!("invalid real literal '{text}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::SourceFile, objects::Value};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn span() -> Span {
        Span::new(SourceFile::new(vec!["test".into()], "x".to_string()), 0..1)
    }

    #[rstest]
    #[case("42", Value::I32(42))]
    #[case("42i8", Value::I8(42))]
    #[case("300i16", Value::I16(300))]
    #[case("7u8", Value::U8(7))]
    #[case("1u64", Value::U64(1))]
    #[case("9f32", Value::F32(9.0))]
    fn decimal_suffixes(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(decode_literal(LiteralKind::Decimal, text, &span()).unwrap(), expected);
    }

    #[test]
    fn arbitrary_precision_suffixes() {
        match decode_literal(LiteralKind::Decimal, "123456789012345678901234567890I", &span()).unwrap() {
            Value::Int(value) => assert_eq!(value.to_string(), "123456789012345678901234567890"),
            other => panic!("expected Int, got {other:?}"),
        }
        assert!(matches!(
            decode_literal(LiteralKind::Decimal, "5U", &span()).unwrap(),
            Value::UInt(_)
        ));
    }

    #[test]
    fn real_defaults_to_float32() {
        assert_eq!(decode_literal(LiteralKind::Real, "1.5", &span()).unwrap(), Value::F32(1.5));
        assert_eq!(decode_literal(LiteralKind::Real, "1.5f64", &span()).unwrap(), Value::F64(1.5));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            decode_literal(LiteralKind::String, "\"a\\nb\"", &span()).unwrap(),
            Value::String("a\nb".into())
        );
    }

    #[test]
    fn out_of_range_decimal_is_an_error() {
        assert!(decode_literal(LiteralKind::Decimal, "99999999999", &span()).is_err());
    }
}
