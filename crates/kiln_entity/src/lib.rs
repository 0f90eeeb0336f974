//! Typed arena references for the lowering engine.
//!
//! Every graph-like structure in the compiler (AST nodes, IR values, blocks,
//! functions) is stored in a flat vector and referred to by a small integer
//! handle. Each handle kind is its own type, so a `Block` can never be used
//! to index the value arena by mistake.

mod primary;
mod secondary;

pub use primary::PrimaryMap;
pub use secondary::SecondaryMap;

/// Trait for types that can be used as entity references.
pub trait EntityRef: Copy + Eq {
    /// Create a new entity reference from a dense index.
    fn new(index: usize) -> Self;
    /// Get the dense index of the entity.
    fn index(self) -> usize;
}

/// Implements [`EntityRef`] for a `struct Name(u32)` newtype.
///
/// With a second argument, also implements `Display` and `Debug` printing the
/// index behind the given prefix (`entity_impl!(Block, "bb")` prints `bb3`).
#[macro_export]
macro_rules! entity_impl {
    ($entity:ident, $display_prefix:expr) => {
        $crate::entity_impl!($entity);

        impl ::core::fmt::Debug for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                (self as &dyn ::core::fmt::Display).fmt(f)
            }
        }

        impl ::core::fmt::Display for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                write!(f, concat!($display_prefix, "{}"), self.0)
            }
        }
    };

    ($entity:ident) => {
        impl $crate::EntityRef for $entity {
            #[inline]
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $entity(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $entity {
            /// Create a new instance from a `u32`.
            #[inline]
            #[allow(dead_code)]
            pub fn from_u32(x: u32) -> Self {
                $entity(x)
            }

            /// Return the underlying index value as a `u32`.
            #[inline]
            #[allow(dead_code)]
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }
    };
}
