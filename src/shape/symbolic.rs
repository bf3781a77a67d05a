use std::fmt::{Debug, Display};
use std::iter::Product;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Rem, RemAssign, Sub, SubAssign};

use rustc_hash::FxHashMap;

/// One element of an RPN-encoded index expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Num(i32),
    Var(char),
    Add,
    Sub,
    Mul,
    /// Floor division (matches integer index arithmetic on-device).
    Div,
    Mod,
    Min,
    Max,
}

impl Default for Term {
    fn default() -> Self {
        Term::Num(0)
    }
}

impl Term {
    fn as_op(self) -> Option<fn(i64, i64) -> Option<i64>> {
        match self {
            Term::Add => Some(|a, b| a.checked_add(b)),
            Term::Sub => Some(|a, b| a.checked_sub(b)),
            Term::Mul => Some(|a, b| a.checked_mul(b)),
            Term::Div => Some(|a, b| (b > 0).then(|| a.div_euclid(b))),
            Term::Mod => Some(|a, b| (b > 0).then(|| a.rem_euclid(b))),
            Term::Min => Some(|a, b| Some(a.min(b))),
            Term::Max => Some(|a, b| Some(a.max(b))),
            _ => None,
        }
    }
}

/// Symbolic integer index expression.
///
/// Stored as a postfix term sequence, so composition (substituting one
/// expression into another) is a splice and never reallocates subtrees.
/// Expressions are immutable values; every operator returns a new one.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Expression {
    pub terms: Vec<Term>,
}

impl Expression {
    /// Evaluate against a variable binding. Returns `None` if a variable is
    /// unbound, a divisor is non-positive, or the result is negative.
    pub fn exec(&self, vars: &FxHashMap<char, usize>) -> Option<usize> {
        let mut stack: Vec<i64> = Vec::with_capacity(8);
        for term in &self.terms {
            match term {
                Term::Num(n) => stack.push(*n as i64),
                Term::Var(c) => stack.push(*vars.get(c)? as i64),
                op => {
                    let rhs = stack.pop()?;
                    let lhs = stack.pop()?;
                    stack.push(op.as_op().unwrap()(lhs, rhs)?);
                }
            }
        }
        let result = stack.pop()?;
        (result >= 0).then_some(result as usize)
    }

    /// Evaluate an expression with no free variables.
    pub fn to_usize(&self) -> Option<usize> {
        self.exec(&FxHashMap::default())
    }

    pub fn is_var(&self, var: char) -> bool {
        self.terms == [Term::Var(var)]
    }

    /// Replace every occurrence of `var` with `expr`.
    pub fn substitute(&self, var: char, expr: &Expression) -> Expression {
        self.substitute_all(&[(var, expr.clone())])
    }

    /// Simultaneously replace variables, so substitutions never see each
    /// other's output (required when rebinding `i`/`j` to expressions that
    /// themselves mention `i` and `j`).
    pub fn substitute_all(&self, subs: &[(char, Expression)]) -> Expression {
        let mut terms = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            match term {
                Term::Var(c) => {
                    if let Some((_, e)) = subs.iter().find(|(v, _)| v == c) {
                        terms.extend_from_slice(&e.terms);
                    } else {
                        terms.push(*term);
                    }
                }
                _ => terms.push(*term),
            }
        }
        Expression { terms }
    }

    /// Conservative algebraic cleanup: constant folding and identity
    /// elimination only. Never changes the value of the expression.
    pub fn simplify(&self) -> Expression {
        let mut out = Vec::with_capacity(self.terms.len());
        Node::parse(&self.terms).fold().emit(&mut out);
        Expression { terms: out }
    }

    pub fn min(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(rhs.into(), Term::Min)
    }

    pub fn max(self, rhs: impl Into<Expression>) -> Expression {
        self.binary(rhs.into(), Term::Max)
    }

    fn binary(mut self, rhs: Expression, op: Term) -> Expression {
        self.terms.extend(rhs.terms);
        self.terms.push(op);
        self
    }
}

/// Transient tree form used for simplification and printing.
#[derive(PartialEq)]
enum Node {
    Num(i64),
    Var(char),
    Op(Term, Box<Node>, Box<Node>),
}

impl Node {
    fn parse(terms: &[Term]) -> Node {
        let mut stack: Vec<Node> = Vec::new();
        for term in terms {
            match term {
                Term::Num(n) => stack.push(Node::Num(*n as i64)),
                Term::Var(c) => stack.push(Node::Var(*c)),
                op => {
                    let rhs = stack.pop().expect("malformed expression");
                    let lhs = stack.pop().expect("malformed expression");
                    stack.push(Node::Op(*op, Box::new(lhs), Box::new(rhs)));
                }
            }
        }
        stack.pop().unwrap_or(Node::Num(0))
    }

    fn fold(self) -> Node {
        let (op, lhs, rhs) = match self {
            Node::Op(op, lhs, rhs) => (op, lhs.fold(), rhs.fold()),
            leaf => return leaf,
        };
        if let (Node::Num(a), Node::Num(b)) = (&lhs, &rhs)
            && let Some(n) = op.as_op().unwrap()(*a, *b)
            && i32::try_from(n).is_ok()
        {
            return Node::Num(n);
        }
        match (op, lhs, rhs) {
            (Term::Add, x, Node::Num(0)) | (Term::Add, Node::Num(0), x) => x,
            (Term::Sub, x, Node::Num(0)) => x,
            (Term::Mul, x, Node::Num(1)) | (Term::Mul, Node::Num(1), x) => x,
            (Term::Mul, _, Node::Num(0)) | (Term::Mul, Node::Num(0), _) => Node::Num(0),
            (Term::Div, x, Node::Num(1)) => x,
            (Term::Mod, _, Node::Num(1)) => Node::Num(0),
            // (x * c) / c == x and (x * c) % c == 0 for c > 0
            (Term::Div, Node::Op(Term::Mul, x, c), Node::Num(n))
                if n > 0 && matches!(c.as_ref(), Node::Num(m) if *m == n) =>
            {
                *x
            }
            (Term::Mod, Node::Op(Term::Mul, _, c), Node::Num(n))
                if n > 0 && matches!(c.as_ref(), Node::Num(m) if *m == n) =>
            {
                Node::Num(0)
            }
            // re-associate trailing constants: (x + a) + b -> x + (a + b)
            (Term::Add, Node::Op(Term::Add, x, a), Node::Num(b)) => match (*a, b) {
                (Node::Num(a), b) if a.checked_add(b).is_some_and(|s| i32::try_from(s).is_ok()) => {
                    Node::Op(Term::Add, x, Box::new(Node::Num(a + b)))
                }
                (a, b) => Node::Op(
                    Term::Add,
                    Box::new(Node::Op(Term::Add, x, Box::new(a))),
                    Box::new(Node::Num(b)),
                ),
            },
            (Term::Mul, Node::Op(Term::Mul, x, a), Node::Num(b)) => match (*a, b) {
                (Node::Num(a), b) if a.checked_mul(b).is_some_and(|p| i32::try_from(p).is_ok()) => {
                    Node::Op(Term::Mul, x, Box::new(Node::Num(a * b)))
                }
                (a, b) => Node::Op(
                    Term::Mul,
                    Box::new(Node::Op(Term::Mul, x, Box::new(a))),
                    Box::new(Node::Num(b)),
                ),
            },
            (op, lhs, rhs) if (op == Term::Min || op == Term::Max) && lhs == rhs => lhs,
            (op, lhs, rhs) => Node::Op(op, Box::new(lhs), Box::new(rhs)),
        }
    }

    fn emit(&self, out: &mut Vec<Term>) {
        match self {
            Node::Num(n) => out.push(Term::Num(*n as i32)),
            Node::Var(c) => out.push(Term::Var(*c)),
            Node::Op(op, lhs, rhs) => {
                lhs.emit(out);
                rhs.emit(out);
                out.push(*op);
            }
        }
    }

    fn write(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Num(n) => write!(f, "{n}"),
            Node::Var(c) => write!(f, "{c}"),
            Node::Op(Term::Min, lhs, rhs) | Node::Op(Term::Max, lhs, rhs) => {
                let name = if matches!(self, Node::Op(Term::Min, ..)) {
                    "min"
                } else {
                    "max"
                };
                write!(f, "{name}(")?;
                lhs.write(f)?;
                write!(f, ", ")?;
                rhs.write(f)?;
                write!(f, ")")
            }
            Node::Op(op, lhs, rhs) => {
                let sym = match op {
                    Term::Add => "+",
                    Term::Sub => "-",
                    Term::Mul => "*",
                    Term::Div => "/",
                    Term::Mod => "%",
                    _ => unreachable!(),
                };
                write!(f, "(")?;
                lhs.write(f)?;
                write!(f, "{sym}")?;
                rhs.write(f)?;
                write!(f, ")")
            }
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Node::parse(&self.terms).write(f)
    }
}

impl Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl From<char> for Expression {
    fn from(c: char) -> Self {
        Expression {
            terms: vec![Term::Var(c)],
        }
    }
}

impl From<i32> for Expression {
    fn from(n: i32) -> Self {
        Expression {
            terms: vec![Term::Num(n)],
        }
    }
}

impl From<usize> for Expression {
    fn from(n: usize) -> Self {
        Expression {
            terms: vec![Term::Num(i32::try_from(n).expect("index constant exceeds i32"))],
        }
    }
}

impl From<&Expression> for Expression {
    fn from(e: &Expression) -> Self {
        e.clone()
    }
}

macro_rules! impl_op {
    ($trait:ident, $assign:ident, $fn:ident, $assign_fn:ident, $term:expr) => {
        impl<E: Into<Expression>> $trait<E> for Expression {
            type Output = Expression;
            fn $fn(self, rhs: E) -> Expression {
                self.binary(rhs.into(), $term)
            }
        }
        impl<E: Into<Expression>> $assign<E> for Expression {
            fn $assign_fn(&mut self, rhs: E) {
                *self = std::mem::take(self).binary(rhs.into(), $term);
            }
        }
    };
}

impl_op!(Add, AddAssign, add, add_assign, Term::Add);
impl_op!(Sub, SubAssign, sub, sub_assign, Term::Sub);
impl_op!(Mul, MulAssign, mul, mul_assign, Term::Mul);
impl_op!(Div, DivAssign, div, div_assign, Term::Div);
impl_op!(Rem, RemAssign, rem, rem_assign, Term::Mod);

impl PartialEq<i32> for Expression {
    fn eq(&self, other: &i32) -> bool {
        self.terms == [Term::Num(*other)]
    }
}

impl<E: Into<Expression>> Product<E> for Expression {
    fn product<I: Iterator<Item = E>>(iter: I) -> Expression {
        iter.fold(Expression::from(1), |acc, e| acc * e.into()).simplify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vars(pairs: &[(char, usize)]) -> FxHashMap<char, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_exec() {
        let e = (Expression::from('i') * 2 + Expression::from('j') / 8) % 16;
        assert_eq!(e.exec(&vars(&[('i', 7), ('j', 11)])), Some(15));
        assert_eq!(e.exec(&vars(&[('i', 7)])), None);
        assert_eq!((Expression::from(3) - 7).to_usize(), None);
    }

    #[test]
    fn test_substitute_simultaneous() {
        // swap i and j; sequential substitution would collapse both to j
        let e = Expression::from('i') * 16 + 'j';
        let swapped =
            e.substitute_all(&[('i', Expression::from('j')), ('j', Expression::from('i'))]);
        assert_eq!(swapped.exec(&vars(&[('i', 3), ('j', 5)])), Some(5 * 16 + 3));
        let pinned = e.substitute('i', &Expression::from(2));
        assert_eq!(pinned.exec(&vars(&[('j', 5)])), Some(2 * 16 + 5));
    }

    #[test]
    fn test_simplify_identities() {
        let x = Expression::from('x');
        assert_eq!((x.clone() + 0).simplify(), x);
        assert_eq!((x.clone() * 1).simplify(), x);
        assert_eq!((x.clone() * 0).simplify(), Expression::from(0));
        assert_eq!((x.clone() % 1).simplify(), Expression::from(0));
        assert_eq!(((x.clone() * 8) / 8).simplify(), x);
        assert_eq!(((x.clone() * 8) % 8).simplify(), Expression::from(0));
        assert_eq!(((x.clone() + 3) + 4).simplify(), (x.clone() + 7).simplify());
        assert_eq!(((x.clone() * 3) * 4).simplify(), (x * 12).simplify());
        assert_eq!(
            (Expression::from(6) * 4 % 5).simplify(),
            Expression::from(4)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]
        #[test]
        fn test_simplify_preserves_value(i in 0usize..64, j in 0usize..64) {
            let e = ((Expression::from('i') * 2 + Expression::from('j') / 8) % 16) * 9
                + (Expression::from('j') % 8 + 0) * 1
                + Expression::from('i') * 0;
            let v = vars(&[('i', i), ('j', j)]);
            prop_assert_eq!(e.simplify().exec(&v), e.exec(&v));
        }
    }

    #[test]
    fn test_display() {
        let e = (Expression::from('a') * 16 + 'i') * 32 + (Expression::from('b') * 8 + 'j');
        assert_eq!(format!("{e}"), "((((a*16)+i)*32)+((b*8)+j))");
    }
}
