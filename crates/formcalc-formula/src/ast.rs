//! Expression tree types

use formcalc_core::Value;
use std::collections::BTreeSet;

/// Parsed expression.
///
/// Infix operators are desugared by the parser, so every computation is a
/// [`Expr::Function`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    // === Literals ===
    /// Constant value
    Literal(Value),

    // === References ===
    /// Variable reference (bare or `$`-prefixed name, prefix stripped)
    Variable(String),

    // === Function call ===
    Function { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Build a function call node; the name is uppercased
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.to_uppercase(),
            args,
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    /// Every variable name referenced anywhere in the tree, including
    /// branches that evaluation may skip
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Expr::Variable(name) = expr {
                names.insert(name.as_str());
            }
        });
        names
    }

    /// Check if any call in the tree satisfies `pred`
    pub fn any_function(&self, pred: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Function { name, args } => pred(name) || args.iter().any(|a| a.any_function(pred)),
            _ => false,
        }
    }

    /// Nesting depth of calls (a literal or variable has depth 0)
    pub fn depth(&self) -> usize {
        match self {
            Expr::Function { args, .. } => 1 + args.iter().map(Expr::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Pre-order walk over every node
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        if let Expr::Function { args, .. } = self {
            for arg in args {
                arg.visit(f);
            }
        }
    }
}
