use std::rc::Rc;

use super::ast::{Binary, Call, Extern, For, Function, If, Number, Prototype, PrototypeKind, Unary, VarIn, Variable};

/// Double dispatch over [`Expression`](super::ast::Expression) variants.
///
/// `C` is threaded from the caller into every visit, the result type is up
/// to the implementor.
pub trait ExpressionVisitor<C> {
    type Output;

    fn visit_number(&mut self, context: C, number: &Number) -> Self::Output;
    fn visit_variable(&mut self, context: C, variable: &Variable) -> Self::Output;
    fn visit_binary(&mut self, context: C, binary: &Binary) -> Self::Output;
    fn visit_unary(&mut self, context: C, unary: &Unary) -> Self::Output;
    fn visit_call(&mut self, context: C, call: &Call) -> Self::Output;
    fn visit_if(&mut self, context: C, if_: &If) -> Self::Output;
    fn visit_for(&mut self, context: C, for_: &For) -> Self::Output;
    fn visit_var_in(&mut self, context: C, var_in: &VarIn) -> Self::Output;
    fn visit_prototype(&mut self, context: C, prototype: &Prototype) -> Self::Output;
    fn visit_function(&mut self, context: C, function: &Rc<Function>) -> Self::Output;
    fn visit_extern(&mut self, context: C, extern_: &Rc<Extern>) -> Self::Output;
}

/// Renders expressions as s-expressions, `1 + 2 * 3` becomes `(+ 1 (* 2 3))`.
pub struct Printer;

impl ExpressionVisitor<()> for Printer {
    type Output = String;

    fn visit_number(&mut self, _: (), number: &Number) -> String {
        format!("{}", number.value)
    }

    fn visit_variable(&mut self, _: (), variable: &Variable) -> String {
        variable.name.clone()
    }

    fn visit_binary(&mut self, _: (), binary: &Binary) -> String {
        format!(
            "({} {} {})",
            binary.kind.symbol(),
            binary.left.accept(self, ()),
            binary.right.accept(self, ())
        )
    }

    fn visit_unary(&mut self, _: (), unary: &Unary) -> String {
        format!("({} {})", unary.name(), unary.operand.accept(self, ()))
    }

    fn visit_call(&mut self, _: (), call: &Call) -> String {
        let arguments = call.arguments.iter()
            .map(|argument| format!(" {}", argument.accept(self, ())))
            .collect::<String>();

        format!("(call {}{})", call.callee, arguments)
    }

    fn visit_if(&mut self, _: (), if_: &If) -> String {
        format!(
            "(if {} {} {})",
            if_.condition.accept(self, ()),
            if_.then.accept(self, ()),
            if_.otherwise.accept(self, ())
        )
    }

    fn visit_for(&mut self, _: (), for_: &For) -> String {
        let step = match &for_.step {
            Some(step) => format!(" {}", step.accept(self, ())),
            None => String::new(),
        };

        format!(
            "(for ({} {} {}{}) {})",
            for_.variable,
            for_.start.accept(self, ()),
            for_.end.accept(self, ()),
            step,
            for_.body.accept(self, ())
        )
    }

    fn visit_var_in(&mut self, _: (), var_in: &VarIn) -> String {
        let binding = match &var_in.initializer {
            Some(initializer) => format!("({} {})", var_in.name, initializer.accept(self, ())),
            None => format!("({})", var_in.name),
        };

        format!("(var {} {})", binding, var_in.body.accept(self, ()))
    }

    fn visit_prototype(&mut self, _: (), prototype: &Prototype) -> String {
        let precedence = match prototype.kind {
            PrototypeKind::BinaryOperator { precedence } => format!(" {precedence}"),
            _ => String::new(),
        };

        let parameters = prototype.parameters.iter()
            .map(|parameter| format!(" {parameter}"))
            .collect::<String>();

        format!("(proto {}{}{})", prototype.linked_name(), precedence, parameters)
    }

    fn visit_function(&mut self, _: (), function: &Rc<Function>) -> String {
        format!(
            "(def {} {})",
            self.visit_prototype((), &function.prototype),
            function.body.accept(self, ())
        )
    }

    fn visit_extern(&mut self, _: (), extern_: &Rc<Extern>) -> String {
        format!("(extern {})", self.visit_prototype((), &extern_.prototype))
    }
}
