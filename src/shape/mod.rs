mod symbolic;
mod tracker;

pub use symbolic::{Expression, Term};
pub use tracker::ShapeTracker;

/// Anything that can be read as an ordered list of dimension sizes.
pub trait ToShape {
    fn to_shape(self) -> Vec<Expression>;
}

impl ToShape for usize {
    fn to_shape(self) -> Vec<Expression> {
        vec![self.into()]
    }
}

impl ToShape for Expression {
    fn to_shape(self) -> Vec<Expression> {
        vec![self]
    }
}

impl ToShape for Vec<Expression> {
    fn to_shape(self) -> Vec<Expression> {
        self
    }
}

impl ToShape for &[Expression] {
    fn to_shape(self) -> Vec<Expression> {
        self.to_vec()
    }
}

impl<const N: usize> ToShape for [Expression; N] {
    fn to_shape(self) -> Vec<Expression> {
        self.into_iter().collect()
    }
}

macro_rules! impl_to_shape_tuple {
    ($($t:ident . $i:tt),+) => {
        impl<$($t: Into<Expression>),+> ToShape for ($($t,)+) {
            fn to_shape(self) -> Vec<Expression> {
                vec![$(self.$i.into()),+]
            }
        }
    };
}

impl_to_shape_tuple!(A.0);
impl_to_shape_tuple!(A.0, B.1);
impl_to_shape_tuple!(A.0, B.1, C.2);
impl_to_shape_tuple!(A.0, B.1, C.2, D.3);
impl_to_shape_tuple!(A.0, B.1, C.2, D.3, E.4);
