//! Pretty printer producing OCL concrete syntax.

use crate::expr::*;
use ocl_types::Type;
use std::fmt::{self, Write};

/// Pretty print an expression to a string.
pub fn pretty_print_expr(expr: &Expr) -> String {
    let mut printer = PrettyPrinter::new();
    printer.print_expr(expr);
    printer.output
}

/// Pretty print a literal to a string.
pub fn pretty_print_literal(literal: &Literal) -> String {
    let mut printer = PrettyPrinter::new();
    printer.print_literal(literal, None);
    printer.output
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty_print_expr(self))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty_print_literal(self))
    }
}

const INFIX: &[&str] = &[
    "+", "-", "*", "/", "<", ">", "<=", ">=", "=", "<>", "and", "or", "xor", "implies", "div",
    "mod",
];

fn is_infix(name: &str, args: &[Expr]) -> bool {
    args.len() == 1 && INFIX.contains(&name)
}

struct PrettyPrinter {
    output: String,
}

impl PrettyPrinter {
    fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn print_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Const(literal) => self.print_literal(literal, Some(&expr.ty)),
            ExprKind::Variable(name) => self.write(name),
            ExprKind::Navigation {
                source, property, ..
            } => {
                self.print_operand(source);
                self.write(".");
                self.write(property.name());
            }
            ExprKind::OperationCall {
                name,
                callee,
                source,
                args,
            } => self.print_call(name, *callee, source, args),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.write("if ");
                self.print_expr(cond);
                self.write(" then ");
                self.print_expr(then_branch);
                self.write(" else ");
                self.print_expr(else_branch);
                self.write(" endif");
            }
            ExprKind::Let { name, value, body } => {
                let _ = write!(self.output, "let {} : {} = ", name, value.ty);
                self.print_expr(value);
                self.write(" in ");
                self.print_expr(body);
            }
            ExprKind::Loop {
                kind,
                source,
                iterators,
                body,
                accumulator,
            } => {
                self.print_operand(source);
                self.write("->");
                self.write(kind.name());
                self.write("(");
                self.write(&iterators.join(", "));
                if let Some(acc) = accumulator {
                    let _ = write!(self.output, "; {} : {} = ", acc.name, acc.ty);
                    self.print_expr(&acc.init);
                }
                self.write(" | ");
                self.print_expr(body);
                self.write(")");
            }
            ExprKind::AllInstances(class) => {
                self.write(class);
                self.write(".allInstances()");
            }
            ExprKind::TypeTest {
                kind,
                source,
                target,
            } => {
                self.print_operand(source);
                let _ = write!(self.output, ".{}({})", kind.name(), target);
            }
            ExprKind::CollectionLiteral { kind, parts } => {
                self.write(kind.name());
                self.write("{");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    match part {
                        CollectionPart::Item(e) => self.print_expr(e),
                        CollectionPart::Range(lo, hi) => {
                            self.print_expr(lo);
                            self.write("..");
                            self.print_expr(hi);
                        }
                    }
                }
                self.write("}");
            }
            ExprKind::TupleLiteral(fields) => {
                self.write("Tuple{");
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.write(name);
                    self.write(" = ");
                    self.print_expr(value);
                }
                self.write("}");
            }
        }
    }

    fn print_call(&mut self, name: &str, callee: Callee, source: &Expr, args: &[Expr]) {
        let builtin = matches!(callee, Callee::Builtin(_));
        if builtin && is_infix(name, args) {
            self.print_operand(source);
            self.write(" ");
            self.write(name);
            self.write(" ");
            self.print_operand(&args[0]);
            return;
        }
        if builtin && args.is_empty() && (name == "not" || name == "-") {
            self.write(name);
            if name == "not" {
                self.write(" ");
            }
            self.print_operand(source);
            return;
        }

        self.print_operand(source);
        self.write(if builtin && source.ty.is_collection() {
            "->"
        } else {
            "."
        });
        self.write(name);
        self.write("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.print_expr(arg);
        }
        self.write(")");
    }

    /// Operands that are themselves operators, conditionals or lets are
    /// parenthesized.
    fn print_operand(&mut self, expr: &Expr) {
        let wrap = match &expr.kind {
            ExprKind::OperationCall {
                name, callee, args, ..
            } => {
                matches!(callee, Callee::Builtin(_))
                    && (is_infix(name, args) || (args.is_empty() && (name == "not" || name == "-")))
            }
            ExprKind::If { .. } | ExprKind::Let { .. } => true,
            _ => false,
        };
        if wrap {
            self.write("(");
            self.print_expr(expr);
            self.write(")");
        } else {
            self.print_expr(expr);
        }
    }

    fn print_literal(&mut self, literal: &Literal, ty: Option<&Type>) {
        match literal {
            Literal::Boolean(b) => self.write(if *b { "true" } else { "false" }),
            Literal::Integer(n) => {
                let _ = write!(self.output, "{}", n);
            }
            Literal::UnlimitedNatural(Some(n)) => {
                let _ = write!(self.output, "{}", n);
            }
            Literal::UnlimitedNatural(None) => self.write("*"),
            Literal::Real(r) => {
                let _ = write!(self.output, "{:?}", r);
            }
            Literal::String(s) => {
                self.write("'");
                self.write(&s.replace('\'', "\\'"));
                self.write("'");
            }
            Literal::Date(d) => {
                let _ = write!(self.output, "Date'{}'", d.format("%Y-%m-%dT%H:%M:%S"));
            }
            Literal::Undefined => match ty {
                Some(ty) if *ty != Type::Undefined => {
                    let _ = write!(self.output, "oclUndefined({})", ty);
                }
                _ => self.write("null"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::ExprBuilder;
    use crate::expr::{CollectionPart, LoopKind};
    use ocl_types::{CollectionKind, EmptySchema, Type};

    #[test]
    fn test_print_operators() {
        let b = ExprBuilder::new(&EmptySchema);
        let sum = b.binary(b.integer(1), "+", b.integer(2)).unwrap();
        let e = b.binary(sum, "*", b.integer(3)).unwrap();
        assert_eq!(e.to_string(), "(1 + 2) * 3");

        let e = b.unary("not", b.boolean(true)).unwrap();
        assert_eq!(e.to_string(), "not true");

        let e = b.call(b.string("it's"), "size", vec![]).unwrap();
        assert_eq!(e.to_string(), "'it\\'s'.size()");
    }

    #[test]
    fn test_print_collections_and_loops() {
        let mut b = ExprBuilder::new(&EmptySchema);
        let source = b
            .collection(
                CollectionKind::Sequence,
                vec![CollectionPart::Range(b.integer(1), b.integer(4))],
                None,
            )
            .unwrap();
        assert_eq!(source.to_string(), "Sequence{1..4}");

        let e = b
            .loop_expr(LoopKind::Select, source.clone(), &["x"], |b| {
                b.binary(b.variable("x")?, ">", b.integer(2))
            })
            .unwrap();
        assert_eq!(e.to_string(), "Sequence{1..4}->select(x | x > 2)");

        let init = b.integer(0);
        let e = b
            .iterate(source.clone(), "x", "acc", Type::Integer, init, |b| {
                b.binary(b.variable("acc")?, "+", b.variable("x")?)
            })
            .unwrap();
        assert_eq!(
            e.to_string(),
            "Sequence{1..4}->iterate(x; acc : Integer = 0 | acc + x)"
        );

        let e = b.call(source, "size", vec![]).unwrap();
        assert_eq!(e.to_string(), "Sequence{1..4}->size()");
    }

    #[test]
    fn test_print_literals() {
        let b = ExprBuilder::new(&EmptySchema);
        assert_eq!(b.real(2.0).to_string(), "2.0");
        assert_eq!(b.unlimited_natural(None).to_string(), "*");
        assert_eq!(b.undefined().to_string(), "null");
        assert_eq!(
            b.undefined_of(Type::Integer).to_string(),
            "oclUndefined(Integer)"
        );
        let t = b
            .tuple(vec![("a".to_string(), b.integer(1))])
            .unwrap();
        assert_eq!(t.to_string(), "Tuple{a = 1}");
    }
}
