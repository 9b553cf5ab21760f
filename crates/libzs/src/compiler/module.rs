//! Module, overload group, import/export and top-level binding compilation.

use crate::{
    context::ScopeValue,
    error::{ImportNotFound, ZsError},
    import::{ImporterKind, ImportRoute, ImportScope},
    objects::{Module, Object, ObjectLocation, Value},
    resolved::{
        NodeLocation, ResolvedExport, ResolvedExportItems, ResolvedImport, ResolvedModule,
        ResolvedNode, ResolvedOverloadGroup, ResolvedSet, ResolvedVar,
    },
};

use super::NodeCompiler;

impl NodeCompiler<'_> {
    pub(crate) fn construct_module(
        &mut self,
        node: NodeLocation,
        module: &ResolvedModule,
    ) -> Result<ObjectLocation, ZsError> {
        let name = module.name.clone().unwrap_or_else(|| "<module>".to_string());
        let location = self.ctx.objects.add(Object::Module(Module::new(name)));
        self.ctx.compiler_cache.insert(node, location);

        for item in module.items.iter() {
            let constructed = self.construct(*item)?;
            if let Some(object) = constructed {
                let kind = crate::objects::ObjectKind::from(self.ctx.objects.get(object));
                match kind {
                    crate::objects::ObjectKind::Class | crate::objects::ObjectKind::Typeclass => {
                        self.ctx.objects.module_mut(location).unwrap().types.push(object);
                    }
                    crate::objects::ObjectKind::Function | crate::objects::ObjectKind::Method => {
                        self.ctx.objects.module_mut(location).unwrap().functions.push(object);
                    }
                    crate::objects::ObjectKind::Module => {
                        self.ctx.objects.module_mut(location).unwrap().submodules.push(object);
                    }
                    _ => {}
                }
            }
        }

        Ok(location)
    }

    /// Module members define themselves; the module only collects their
    /// values into its visible member table.
    pub(crate) fn define_module(
        &mut self,
        _node: NodeLocation,
        module: &ResolvedModule,
        object: Option<ObjectLocation>,
    ) -> Result<(), ZsError> {
        let location = object.expect("modules always construct an object");

        for item in module.items.iter() {
            let defined = self.require_definition(*item)?;
            let name = self.ctx.nodes.get(*item).name().map(|name| name.to_string());
            if let Some(name) = name {
                let value = match defined {
                    Some(object) => Some(Value::Object(object)),
                    None => self.ctx.compiler_cache.value(*item).cloned(),
                };
                if let Some(value) = value {
                    self.ctx
                        .objects
                        .module_mut(location)
                        .unwrap()
                        .members
                        .insert(name, value);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn construct_group(
        &mut self,
        node: NodeLocation,
        group: &ResolvedOverloadGroup,
    ) -> Result<ObjectLocation, ZsError> {
        let location = self.ctx.objects.add(Object::OverloadGroup(crate::objects::OverloadGroup {
            name: group.name.clone(),
            parent: None,
            overloads: Vec::new(),
        }));
        self.ctx.compiler_cache.insert(node, location);
        Ok(location)
    }

    pub(crate) fn define_group(
        &mut self,
        _node: NodeLocation,
        group: &ResolvedOverloadGroup,
        object: Option<ObjectLocation>,
    ) -> Result<(), ZsError> {
        let location = object.expect("groups always construct an object");

        let parent = match group.parent {
            Some(parent) => self.require_definition(parent)?,
            None => None,
        };

        let mut overloads = Vec::new();
        for overload in group.overloads.iter() {
            if let Some(function) = self.require_definition(*overload)? {
                overloads.push(function);
            }
        }

        if let Object::OverloadGroup(group) = self.ctx.objects.get_mut(location) {
            group.parent = parent;
            group.overloads = overloads;
        }
        Ok(())
    }

    /// Import definition: evaluate the source, resolve it through the
    /// import system and bind the imported names to their values.
    pub(crate) fn define_import(
        &mut self,
        node: NodeLocation,
        import: &ResolvedImport,
    ) -> Result<(), ZsError> {
        let source_value = self.evaluate(import.source)?;
        let source = match source_value {
            Some(Value::String(source)) => source.to_string(),
            _ => return Err(self.error_at(node, "import source must be a String")),
        };

        let scope = self.import_scope(node, &source)?;

        for imported in import.imported_names.iter() {
            let (origin, span) = match self.ctx.nodes.get(*imported) {
                ResolvedNode::ImportedName(name) => (name.origin.clone(), name.span.clone()),
                _ => continue,
            };
            match scope.get_name(&origin) {
                Some(value) => {
                    self.ctx.compiler_cache.set_value(*imported, value.clone());
                    self.ctx.compiler_cache.mark_defined(*imported);
                }
                None => {
                    return Err(ZsError::ImportNotFound(
                        ImportNotFound {
                            import_source: format!("{source}#{origin}"),
                            position: span.position.clone().into(),
                            code: (&span.file).into(),
                        }
                        .into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Resolves one import source to its scope, using the cache first.
    pub(crate) fn import_scope(&mut self, node: NodeLocation, source: &str) -> Result<ImportScope, ZsError> {
        if let Some(cached) = self.ctx.import_system.cached(source) {
            return Ok(cached.clone());
        }

        let route = self.ctx.import_system.route(source, None);
        match route {
            ImportRoute::Scheme { importer: ImporterKind::Modules, rest } => {
                let scope = self
                    .ctx
                    .import_system
                    .get_module(&rest)
                    .cloned()
                    .ok_or_else(|| self.import_not_found(node, source))?;
                self.ctx.import_system.cache_result(source.to_string(), scope.clone());
                Ok(scope)
            }
            // document imports are pre-executed by the toolchain and land
            // in the cache; reaching this arm means the source was not a
            // compile-time literal the toolchain could see
            _ => Err(self.import_not_found(node, source)),
        }
    }

    fn import_not_found(&self, node: NodeLocation, source: &str) -> ZsError {
        let span = self.node_span(node);
        let (position, code) = match span {
            Some(span) => (span.position.clone(), (&span.file).into()),
            None => (0..0, crate::file::SourceFile::new(vec!["<unknown>".into()], String::new()).into()),
        };
        ZsError::ImportNotFound(
            ImportNotFound {
                import_source: source.to_string(),
                position: position.into(),
                code,
            }
            .into(),
        )
    }

    /// Export definition: make names part of the document's public surface.
    pub(crate) fn define_export(
        &mut self,
        node: NodeLocation,
        export: &ResolvedExport,
    ) -> Result<(), ZsError> {
        // the document scope is the closest scope that still contains the
        // exporting node's names; exports always run at document level
        let document_scope = self
            .ctx
            .documents
            .values()
            .find(|document| {
                self.node_span(node)
                    .map(|span| document.file.as_ref() == Some(&span.file))
                    .unwrap_or(false)
            })
            .map(|document| document.scope);
        let document_scope = match document_scope {
            Some(scope) => scope,
            None => return Err(self.error_at(node, "export outside of a document")),
        };

        match &export.items {
            ResolvedExportItems::Declaration(declaration) => {
                self.require_definition(*declaration)?;
                Ok(())
            }
            ResolvedExportItems::Name(name) => {
                // promote a referred (imported) name to a defined one
                self.ctx
                    .scopes
                    .promote_to_defined(document_scope, name)
                    .map_err(|_| self.error_at(node, format!("'{name}' is not visible here")))
            }
            ResolvedExportItems::Named(names) => {
                let source = export
                    .source
                    .ok_or_else(|| self.error_at(node, "named export list requires a source"))?;
                let source_value = self.evaluate(source)?;
                let source = match source_value {
                    Some(Value::String(source)) => source.to_string(),
                    _ => return Err(self.error_at(node, "export source must be a String")),
                };
                let scope = self.import_scope(node, &source)?;
                for (origin, alias) in names.iter() {
                    let value = scope
                        .get_name(origin)
                        .cloned()
                        .ok_or_else(|| self.import_not_found(node, &format!("{source}#{origin}")))?;
                    self.ctx
                        .scopes
                        .create_name(document_scope, alias, ScopeValue::Object(value))
                        .map_err(|_| self.error_at(node, format!("'{alias}' is already bound")))?;
                }
                Ok(())
            }
            ResolvedExportItems::All => {
                let source = export
                    .source
                    .ok_or_else(|| self.error_at(node, "'export *' requires a source"))?;
                let source_value = self.evaluate(source)?;
                let source = match source_value {
                    Some(Value::String(source)) => source.to_string(),
                    _ => return Err(self.error_at(node, "export source must be a String")),
                };
                let scope = self.import_scope(node, &source)?;
                for (name, value) in scope.all() {
                    self.ctx
                        .scopes
                        .create_name(document_scope, name, ScopeValue::Object(value.clone()))
                        .map_err(|_| self.error_at(node, format!("'{name}' is already bound")))?;
                }
                Ok(())
            }
        }
    }

    /// A top-level `var` is a compile-time binding: its initializer is
    /// evaluated once and the value cached for every reference site.
    pub(crate) fn define_top_level_var(
        &mut self,
        node: NodeLocation,
        var: &ResolvedVar,
    ) -> Result<(), ZsError> {
        let initializer = var
            .initializer
            .ok_or_else(|| self.error_at(node, "a top-level 'var' requires an initializer"))?;
        let value = self
            .evaluate(initializer)?
            .ok_or_else(|| self.error_at(node, "initializer has no value"))?;

        if let Some(var_type) = var.var_type {
            let declared = self.evaluate_type(var_type)?;
            let actual = value.runtime_type(&self.ctx.objects);
            if !crate::objects::types::assignable_to(&self.ctx.objects, &actual, &declared) {
                return Err(self.types_do_not_match(node, &declared, &actual));
            }
        }

        self.ctx.compiler_cache.set_value(node, value);
        Ok(())
    }

    /// Top-level `set` rebinds an already-defined compile-time binding.
    pub(crate) fn define_top_level_set(
        &mut self,
        node: NodeLocation,
        set: &ResolvedSet,
    ) -> Result<(), ZsError> {
        let target = set
            .target
            .ok_or_else(|| self.error_at(node, format!("'{}' is not bound", set.name)))?;
        self.require_definition(target)?;
        let value = self
            .evaluate(set.value)?
            .ok_or_else(|| self.error_at(node, "expression has no value"))?;
        self.ctx.compiler_cache.set_value(target, value);
        Ok(())
    }

    pub(crate) fn types_do_not_match(
        &self,
        node: NodeLocation,
        expected: &crate::objects::TypeValue,
        found: &crate::objects::TypeValue,
    ) -> ZsError {
        let span = self.node_span(node);
        let (position, code) = match span {
            Some(span) => (span.position.clone(), (&span.file).into()),
            None => (0..0, crate::file::SourceFile::new(vec!["<unknown>".into()], String::new()).into()),
        };
        ZsError::TypesDoNotMatch(
            crate::error::TypesDoNotMatch {
                expected: crate::objects::types::type_name(&self.ctx.objects, expected),
                found: crate::objects::types::type_name(&self.ctx.objects, found),
                position: position.into(),
                code,
            }
            .into(),
        )
    }
}
