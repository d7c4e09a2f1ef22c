use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        pub struct $name(u128);

        impl $name {
            /// Reserved for "unset".
            pub const ZERO: Self = Self(0);

            pub fn random() -> Self {
                Self(rand::random())
            }

            pub const fn from_u128(v: u128) -> Self {
                Self(v)
            }

            pub const fn as_u128(self) -> u128 {
                self.0
            }

            /// Wire form used by `ConnectReq`/`ConnectReply` payloads: low
            /// then high 64 bits, matching the "128-bit identifiers as two
            /// u64s" rule in the frame payload encoding.
            pub const fn to_le_parts(self) -> (u64, u64) {
                (self.0 as u64, (self.0 >> 64) as u64)
            }

            pub const fn from_le_parts(low: u64, high: u64) -> Self {
                Self((low as u128) | ((high as u128) << 64))
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#034x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }
    };
}

opaque_id!(NodeId);
opaque_id!(ObjectId);
