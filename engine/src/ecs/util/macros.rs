/// Invoke a macro once per tuple arity, growing an accumulated type list.
#[macro_export]
macro_rules! grow_tuples {
    ($m:ident, [$($acc:ident),*], $next:ident $(, $tail:ident)*) => {
        $m!($($acc,)* $next);
        $crate::grow_tuples!($m, [$($acc,)* $next] $(, $tail)*);
    };
    ($m:ident, [$($acc:ident),*]) => {};
}

/// Apply a macro to tuples of every arity from `(A,)` through `(A, ..., Z)`.
#[macro_export]
macro_rules! all_tuples {
    ($m:ident) => {
        $crate::grow_tuples!(
            $m, [], A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, T, U, V, W, X, Y, Z
        );
    };
}

#[cfg(test)]
mod tests {
    use std::marker::PhantomData;

    struct Arity<T>(PhantomData<T>);

    macro_rules! impl_arity {
        ($($name:ident),*) => {
            #[allow(dead_code)]
            impl<$($name),*> Arity<($($name,)*)> {
                const COUNT: usize = [$(stringify!($name)),*].len();
            }
        };
    }

    all_tuples!(impl_arity);

    #[test]
    fn covers_every_arity() {
        // Given tuple markers of assorted lengths
        // Then each length got its own impl
        assert_eq!(Arity::<(u8,)>::COUNT, 1);
        assert_eq!(Arity::<(u8, u16, u32)>::COUNT, 3);
        assert_eq!(
            Arity::<(
                u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8,
                u8, u8, u8, u8, u8, u8
            )>::COUNT,
            26
        );
    }
}
