use std::{collections::{HashMap, HashSet}, rc::Rc};

use crate::{
    backend::prelude::{ArithOp, Backend, BackendError, CompareOp},
    parser::prelude::{
        Binary, BinaryOp, Call, Expression, ExpressionVisitor, Extern, For, Function, If, Number, Prototype,
        Unary, VarIn, Variable, ANONYMOUS_FUNCTION
    },
    utils::prelude::{Outcome, SrcSpan},
};
use super::{context::Context, error::{CodegenError, FormError}};

/// What lowering an expression produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Artifact<V, F> {
    Value(V),
    Function(F),
}

type Lowered<B> = Result<
    (Context<<B as Backend>::Slot>, Artifact<<B as Backend>::Value, <B as Backend>::Function>),
    CodegenError
>;

/// Lowers batches of top-level forms into fresh units of `B` and runs them.
///
/// Definitions live on in the registry after their unit is gone and are
/// lowered again into the first later unit that calls them.
pub struct Evaluator<B: Backend> {
    backend: B,
    registry: HashMap<String, Expression>,
    units: usize,
    anonymous: usize,
    keep_listing: bool,
    listing: Option<String>,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: HashMap::new(),
            units: 0,
            anonymous: 0,
            keep_listing: false,
            listing: None,
        }
    }

    /// Keep the listing of every unit, see [`Evaluator::last_listing`].
    pub fn with_listing(mut self, keep: bool) -> Self {
        self.keep_listing = keep;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn registered(&self) -> Vec<&str> {
        let mut names = self.registry.keys()
            .map(String::as_str)
            .collect::<Vec<&str>>();

        names.sort();
        names
    }

    /// Listing of the last unit, taken after it was finished.
    pub fn last_listing(&self) -> Option<&str> {
        self.listing.as_deref()
    }

    /// Lowers every form into a new unit, then runs the anonymous ones in
    /// order and returns their values.
    ///
    /// A form that fails to lower is reported and skipped, the rest of the
    /// batch still goes through.
    pub fn run_batch(&mut self, forms: &[Expression]) -> Outcome<Vec<f64>, Vec<FormError>> {
        self.units += 1;
        self.anonymous = 0;
        self.listing = None;

        if let Err(err) = self.backend.begin_unit(&format!("unit.{}", self.units)) {
            return Outcome::PartialFailure(vec![], vec![FormError {
                index: None,
                location: None,
                error: err.into(),
            }]);
        }

        let mut queue = vec![];
        let mut errors = vec![];

        for (index, form) in forms.iter().enumerate() {
            match self.lower_form(form) {
                Ok(function) if form.is_anonymous() => queue.push((index, form.location(), function)),
                Ok(_) => {},
                Err(error) => errors.push(FormError {
                    index: Some(index),
                    location: error.location().or(Some(form.location())),
                    error,
                }),
            }
        }

        let mut values = vec![];

        match self.backend.finish_unit() {
            Ok(()) => {
                if self.keep_listing {
                    self.listing = Some(self.backend.dump());
                }

                for (index, location, function) in queue {
                    match self.backend.execute(function) {
                        Ok(value) => values.push(value),
                        Err(err) => errors.push(FormError {
                            index: Some(index),
                            location: Some(location),
                            error: err.into(),
                        }),
                    }
                }
            },
            Err(err) => errors.push(FormError {
                index: None,
                location: None,
                error: err.into(),
            }),
        }

        self.backend.dispose_unit();

        if errors.is_empty() {
            Outcome::Ok(values)
        } else {
            errors.sort_by_key(|err| err.index);
            Outcome::PartialFailure(values, errors)
        }
    }

    fn lower_form(&mut self, form: &Expression) -> Result<B::Function, CodegenError> {
        if !matches!(form, Expression::Function(_) | Expression::Extern(_) | Expression::Prototype(_)) {
            return Err(CodegenError::ExpectedFunction { location: form.location() });
        }

        // registrations and declarations of a failed form are undone
        let previous = form.linked_name()
            .filter(|_| !form.is_anonymous())
            .map(|name| {
                let entry = self.registry.get(&name).cloned();
                let declared = self.backend.get_function(&name).is_some();
                (name, entry, declared)
            });

        let result = form.accept(self, Context::new()).and_then(|(_, artifact)| match artifact {
            Artifact::Function(function) => Ok(function),
            Artifact::Value(_) => Err(CodegenError::ExpectedFunction { location: form.location() }),
        });

        if result.is_err() {
            if let Some((name, entry, declared)) = previous {
                if !declared {
                    if let Some(function) = self.backend.get_function(&name) {
                        self.backend.forget_function(function);
                    }
                }

                match entry {
                    Some(entry) => {
                        self.registry.insert(name, entry);
                    },
                    None => {
                        self.registry.remove(&name);
                    },
                }
            }
        }

        result
    }

    fn value(&mut self, context: &Context<B::Slot>, expression: &Expression) -> Result<B::Value, CodegenError> {
        match expression.accept(self, context.clone())? {
            (_, Artifact::Value(value)) => Ok(value),
            (_, Artifact::Function(_)) => Err(CodegenError::ExpectedValue { location: expression.location() }),
        }
    }

    fn current_function(&self) -> Result<B::Function, CodegenError> {
        self.backend.current_function()
            .ok_or(CodegenError::Backend(BackendError::NoInsertionPoint))
    }

    fn lower_prototype(&mut self, prototype: &Prototype) -> Result<B::Function, CodegenError> {
        let mut seen = HashSet::new();

        for parameter in &prototype.parameters {
            if !seen.insert(parameter.as_str()) {
                return Err(CodegenError::DuplicateParameter {
                    function: prototype.linked_name(),
                    name: parameter.clone(),
                    location: prototype.location,
                });
            }
        }

        if prototype.is_anonymous() {
            let name = format!("{ANONYMOUS_FUNCTION}.{}", self.anonymous);
            self.anonymous += 1;

            return Ok(self.backend.declare_function(&name, &prototype.parameters)?);
        }

        let name = prototype.linked_name();

        match self.backend.get_function(&name) {
            Some(function) => {
                let previous = self.backend.parameter_count(function);

                if previous != prototype.arity() {
                    return Err(CodegenError::RedefinitionArity {
                        name,
                        previous,
                        found: prototype.arity(),
                        location: prototype.location,
                    });
                }

                if self.backend.has_body(function) {
                    return Err(CodegenError::Redefinition { name, location: prototype.location });
                }

                Ok(function)
            },
            None => Ok(self.backend.declare_function(&name, &prototype.parameters)?),
        }
    }

    fn lower_function(&mut self, definition: &Function) -> Result<B::Function, CodegenError> {
        let function = self.lower_prototype(&definition.prototype)?;

        match self.lower_body(function, definition) {
            Ok(()) => Ok(function),
            Err(err) => {
                self.backend.discard_body(function);
                Err(err)
            },
        }
    }

    fn lower_body(&mut self, function: B::Function, definition: &Function) -> Result<(), CodegenError> {
        let entry = self.backend.append_block(function, "entry")?;
        self.backend.position_at_end(entry);

        let mut context = Context::new();

        for (index, name) in definition.prototype.parameters.iter().enumerate() {
            let slot = self.backend.build_slot(function, name)?;
            let value = self.backend.parameter(function, index)?;
            self.backend.build_store(slot, value)?;

            context = context.bind(name, slot);
        }

        let value = self.value(&context, &definition.body)?;
        self.backend.build_return(value)?;

        Ok(())
    }

    /// Finds `name` in the current unit, lowering it from the registry on a miss.
    fn resolve_function(&mut self, name: &str, location: SrcSpan) -> Result<B::Function, CodegenError> {
        let existing = self.backend.get_function(name);

        if let Some(function) = existing {
            if self.backend.has_body(function) {
                return Ok(function);
            }
        }

        match self.registry.get(name).cloned() {
            Some(Expression::Function(definition)) => {
                let saved = self.backend.insert_block();
                let result = self.lower_function(&definition);

                if let Some(block) = saved {
                    self.backend.position_at_end(block);
                }

                // spans inside the definition belong to an older source
                result.map_err(|error| match error {
                    CodegenError::Backend(_) => error,
                    error => CodegenError::InDefinition {
                        name: name.to_string(),
                        location,
                        error: Box::new(error),
                    },
                })
            },
            Some(Expression::Extern(declaration)) => match existing {
                Some(function) => Ok(function),
                None => self.lower_prototype(&declaration.prototype),
            },
            _ => Err(CodegenError::UnknownFunction { name: name.to_string(), location }),
        }
    }

    fn lower_call(
        &mut self,
        context: &Context<B::Slot>,
        name: &str,
        arguments: &[&Expression],
        location: SrcSpan
    ) -> Result<B::Value, CodegenError> {
        let function = self.resolve_function(name, location)?;
        let expected = self.backend.parameter_count(function);

        if expected != arguments.len() {
            return Err(CodegenError::ArgumentCount {
                name: name.to_string(),
                expected,
                found: arguments.len(),
                location,
            });
        }

        let mut values = Vec::with_capacity(arguments.len());

        for argument in arguments {
            values.push(self.value(context, argument)?);
        }

        Ok(self.backend.build_call(function, &values, "calltmp")?)
    }

    fn register(&mut self, name: String, form: Expression) {
        self.registry.insert(name, form);
    }
}

impl<B: Backend> ExpressionVisitor<Context<B::Slot>> for Evaluator<B> {
    type Output = Lowered<B>;

    fn visit_number(&mut self, context: Context<B::Slot>, number: &Number) -> Self::Output {
        let value = self.backend.const_number(number.value);

        Ok((context, Artifact::Value(value)))
    }

    fn visit_variable(&mut self, context: Context<B::Slot>, variable: &Variable) -> Self::Output {
        let slot = context.lookup(&variable.name)
            .copied()
            .ok_or_else(|| CodegenError::UnboundVariable {
                name: variable.name.clone(),
                location: variable.location,
            })?;

        let value = self.backend.build_load(slot, &variable.name)?;

        Ok((context, Artifact::Value(value)))
    }

    fn visit_binary(&mut self, context: Context<B::Slot>, binary: &Binary) -> Self::Output {
        let value = match &binary.kind {
            BinaryOp::Assign => {
                let Expression::Variable(target) = binary.left.as_ref() else {
                    return Err(CodegenError::AssignToNonVariable { location: binary.left.location() });
                };

                let value = self.value(&context, &binary.right)?;

                let slot = context.lookup(&target.name)
                    .copied()
                    .ok_or_else(|| CodegenError::UnboundVariable {
                        name: target.name.clone(),
                        location: target.location,
                    })?;

                self.backend.build_store(slot, value)?;

                value
            },
            BinaryOp::User(_) => {
                let name = binary.callee().unwrap_or_default();

                self.lower_call(&context, &name, &[binary.left.as_ref(), binary.right.as_ref()], binary.location)?
            },
            kind => {
                let left = self.value(&context, &binary.left)?;
                let right = self.value(&context, &binary.right)?;

                match kind {
                    BinaryOp::Add => self.backend.build_arith(ArithOp::Add, left, right)?,
                    BinaryOp::Subtract => self.backend.build_arith(ArithOp::Subtract, left, right)?,
                    BinaryOp::Multiply => self.backend.build_arith(ArithOp::Multiply, left, right)?,
                    BinaryOp::LessThan => self.backend.build_compare(CompareOp::LessThan, left, right)?,
                    BinaryOp::Equal => self.backend.build_compare(CompareOp::Equal, left, right)?,
                    BinaryOp::Assign | BinaryOp::User(_) => unreachable!("handled above"),
                }
            },
        };

        Ok((context, Artifact::Value(value)))
    }

    fn visit_unary(&mut self, context: Context<B::Slot>, unary: &Unary) -> Self::Output {
        let value = self.lower_call(&context, &unary.callee(), &[unary.operand.as_ref()], unary.location)?;

        Ok((context, Artifact::Value(value)))
    }

    fn visit_call(&mut self, context: Context<B::Slot>, call: &Call) -> Self::Output {
        let arguments = call.arguments.iter().collect::<Vec<&Expression>>();
        let value = self.lower_call(&context, &call.callee, &arguments, call.location)?;

        Ok((context, Artifact::Value(value)))
    }

    fn visit_if(&mut self, context: Context<B::Slot>, if_: &If) -> Self::Output {
        let condition = self.value(&context, &if_.condition)?;
        let condition = self.backend.build_truth_test(condition)?;

        let function = self.current_function()?;
        let then_block = self.backend.append_block(function, "then")?;
        let else_block = self.backend.append_block(function, "else")?;
        let merge_block = self.backend.append_block(function, "ifcont")?;

        self.backend.build_conditional_branch(condition, then_block, else_block)?;

        self.backend.position_at_end(then_block);
        let then_value = self.value(&context, &if_.then)?;
        self.backend.build_branch(merge_block)?;
        // nested control flow moves the end of the branch
        let then_end = self.backend.insert_block().unwrap_or(then_block);

        self.backend.position_at_end(else_block);
        let else_value = self.value(&context, &if_.otherwise)?;
        self.backend.build_branch(merge_block)?;
        let else_end = self.backend.insert_block().unwrap_or(else_block);

        self.backend.position_at_end(merge_block);
        let value = self.backend.build_phi(&[(then_value, then_end), (else_value, else_end)], "iftmp")?;

        Ok((context, Artifact::Value(value)))
    }

    fn visit_for(&mut self, context: Context<B::Slot>, for_: &For) -> Self::Output {
        let function = self.current_function()?;

        let start = self.value(&context, &for_.start)?;
        let slot = self.backend.build_slot(function, &for_.variable)?;
        self.backend.build_store(slot, start)?;

        let inner = context.bind(&for_.variable, slot);

        let loop_block = self.backend.append_block(function, "loop")?;
        self.backend.build_branch(loop_block)?;
        self.backend.position_at_end(loop_block);

        self.value(&inner, &for_.body)?;

        let current = self.backend.build_load(slot, &for_.variable)?;
        let step = match &for_.step {
            Some(step) => self.value(&inner, step)?,
            None => self.backend.const_number(1.0),
        };
        let next = self.backend.build_arith(ArithOp::Add, current, step)?;
        self.backend.build_store(slot, next)?;

        let end = self.value(&inner, &for_.end)?;
        let end = self.backend.build_truth_test(end)?;

        let after_block = self.backend.append_block(function, "afterloop")?;
        self.backend.build_conditional_branch(end, loop_block, after_block)?;
        self.backend.position_at_end(after_block);

        let zero = self.backend.const_number(0.0);

        Ok((context, Artifact::Value(zero)))
    }

    fn visit_var_in(&mut self, context: Context<B::Slot>, var_in: &VarIn) -> Self::Output {
        let function = self.current_function()?;

        let initial = match &var_in.initializer {
            Some(initializer) => self.value(&context, initializer)?,
            None => self.backend.const_number(0.0),
        };

        let slot = self.backend.build_slot(function, &var_in.name)?;
        self.backend.build_store(slot, initial)?;

        let inner = context.bind(&var_in.name, slot);
        let value = self.value(&inner, &var_in.body)?;

        Ok((context, Artifact::Value(value)))
    }

    fn visit_prototype(&mut self, context: Context<B::Slot>, prototype: &Prototype) -> Self::Output {
        let function = self.lower_prototype(prototype)?;

        Ok((context, Artifact::Function(function)))
    }

    fn visit_function(&mut self, context: Context<B::Slot>, function: &Rc<Function>) -> Self::Output {
        if !function.prototype.is_anonymous() {
            self.register(function.prototype.linked_name(), Expression::Function(function.clone()));
        }

        let lowered = self.lower_function(function)?;

        Ok((context, Artifact::Function(lowered)))
    }

    fn visit_extern(&mut self, context: Context<B::Slot>, extern_: &Rc<Extern>) -> Self::Output {
        self.register(extern_.prototype.linked_name(), Expression::Extern(extern_.clone()));

        let function = self.lower_prototype(&extern_.prototype)?;

        Ok((context, Artifact::Function(function)))
    }
}
