// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Argument unpacking for `starmap`.
//!
//! A star function receives the fields of a tuple item as separate
//! positional arguments, with the worker's resource appended last:
//! an item `(url, timeout)` calls `f(url, timeout, &mut session)`.

/// Function callable with an unpacked argument tuple plus the worker resource
pub trait StarFn<Args, R> {
    type Output;

    fn call_star(&self, args: Args, resource: &mut R) -> anyhow::Result<Self::Output>;
}

macro_rules! impl_star_fn {
    ($($arg:ident),+) => {
        impl<Func, R, U, $($arg,)+> StarFn<($($arg,)+), R> for Func
        where
            Func: Fn($($arg,)+ &mut R) -> anyhow::Result<U>,
        {
            type Output = U;

            #[allow(non_snake_case)]
            fn call_star(&self, ($($arg,)+): ($($arg,)+), resource: &mut R) -> anyhow::Result<U> {
                (self)($($arg,)+ resource)
            }
        }
    };
}

impl_star_fn!(A1);
impl_star_fn!(A1, A2);
impl_star_fn!(A1, A2, A3);
impl_star_fn!(A1, A2, A3, A4);
impl_star_fn!(A1, A2, A3, A4, A5);
impl_star_fn!(A1, A2, A3, A4, A5, A6);
