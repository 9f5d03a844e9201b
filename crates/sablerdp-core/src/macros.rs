//! Helper macros for encoding and decoding.
//!
//! Exported and available to the other workspace crates.

/// Expands to the path of the enclosing function as a `&'static str`.
#[macro_export]
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}

#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if !(received >= expected) {
            return Err($crate::not_enough_bytes_err($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: $crate::function!(), in: $buf, size: $expected)
    }};
}

#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    };
}

#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        $len.try_into()
            .map_err(|_| $crate::invalid_field_err($ctx, $field, "too many elements"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!($crate::function!(), $field, $len)
    }};
}

#[macro_export]
macro_rules! invalid_field_err {
    ($field:expr, $reason:expr $(,)?) => {{
        $crate::invalid_field_err($crate::function!(), $field, $reason)
    }};
}

#[macro_export]
macro_rules! unexpected_message_type_err {
    ($got:expr $(,)?) => {{
        $crate::unexpected_message_type_err($crate::function!(), $got)
    }};
    ($ctx:expr, $got:expr $(,)?) => {{
        $crate::unexpected_message_type_err($ctx, $got)
    }};
}

#[macro_export]
macro_rules! unsupported_version_err {
    ($name:expr, $got:expr $(,)?) => {{
        $crate::unsupported_version_err($name, $got)
    }};
}

#[macro_export]
macro_rules! unsupported_value_err {
    ($name:expr, $value:expr $(,)?) => {{
        $crate::unsupported_value_err($crate::function!(), $name, $value)
    }};
}

#[macro_export]
macro_rules! other_err {
    ($ctx:expr, source: $source:expr $(,)?) => {{
        $crate::other_err_with_source($ctx, "", $source)
    }};
    (source: $source:expr $(,)?) => {{
        $crate::other_err_with_source($crate::function!(), "", $source)
    }};
    ($ctx:expr, $description:expr $(,)?) => {{
        $crate::other_err($ctx, $description)
    }};
    ($description:expr $(,)?) => {{
        $crate::other_err($crate::function!(), $description)
    }};
}

#[macro_export]
macro_rules! read_padding {
    ($src:expr, $n:expr) => {
        $crate::read_padding($src, $n)
    };
}

#[macro_export]
macro_rules! write_padding {
    ($dst:expr, $n:expr) => {
        $crate::write_padding($dst, $n)
    };
}

/// Asserts that the traits support dynamic dispatch.
#[macro_export]
macro_rules! assert_obj_safe {
    ($($xs:path),+ $(,)?) => {
        $(const _: Option<&dyn $xs> = None;)+
    };
}

/// Asserts that the type implements _all_ of the given traits.
#[macro_export]
macro_rules! assert_impl {
    ($type:ty: $($trait:path),+ $(,)?) => {
        const _: fn() = || {
            fn assert_impl_all<T: ?Sized $(+ $trait)+>() {}
            assert_impl_all::<$type>();
        };
    };
}
