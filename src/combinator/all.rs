//! Join futures over fixed tuples of child coroutines.

use super::{ChildSlot, IntoAll};
use std::future::Future;
use std::panic::resume_unwind;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Degenerate join of zero children. Completes synchronously with `()`.
pub struct All0;

impl Future for All0 {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        Poll::Ready(())
    }
}

impl IntoAll for () {
    type Future = All0;

    fn into_all(self) -> All0 {
        All0
    }
}

macro_rules! all_tuple {
    ($All:ident => ($(($F:ident, $slot:ident)),+) rev ($($rslot:ident),+)) => {
        /// Join over a fixed tuple of child coroutines.
        ///
        /// Completes once every child has settled; the output tuple
        /// preserves argument order. Dropping this future destroys the
        /// children in reverse argument order.
        pub struct $All<$($F: Future),+> {
            $($slot: ChildSlot<$F>,)+
        }

        impl<$($F: Future),+> Unpin for $All<$($F),+> {}

        impl<$($F: Future),+> Future for $All<$($F),+> {
            type Output = ($($F::Output,)+);

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let this = self.get_mut();
                $(this.$slot.poll_advance(cx);)+
                if $(!this.$slot.is_running())&&+ {
                    // Joined: surface the first failure in argument order,
                    // otherwise hand back every value.
                    $(
                        if let Some(payload) = this.$slot.take_failure() {
                            resume_unwind(payload.into_unwind());
                        }
                    )+
                    Poll::Ready(($(this.$slot.take_value(),)+))
                } else {
                    Poll::Pending
                }
            }
        }

        impl<$($F: Future),+> Drop for $All<$($F),+> {
            fn drop(&mut self) {
                // Reverse argument order.
                $(self.$rslot.cancel();)+
            }
        }

        impl<$($F: Future),+> IntoAll for ($($F,)+) {
            type Future = $All<$($F),+>;

            fn into_all(self) -> Self::Future {
                let ($($slot,)+) = self;
                $All {
                    $($slot: ChildSlot::new($slot),)+
                }
            }
        }
    };
}

all_tuple!(All1 => ((F1, c1)) rev (c1));
all_tuple!(All2 => ((F1, c1), (F2, c2)) rev (c2, c1));
all_tuple!(All3 => ((F1, c1), (F2, c2), (F3, c3)) rev (c3, c2, c1));
all_tuple!(All4 => ((F1, c1), (F2, c2), (F3, c3), (F4, c4)) rev (c4, c3, c2, c1));
all_tuple!(All5 => ((F1, c1), (F2, c2), (F3, c3), (F4, c4), (F5, c5)) rev (c5, c4, c3, c2, c1));
all_tuple!(All6 => ((F1, c1), (F2, c2), (F3, c3), (F4, c4), (F5, c5), (F6, c6)) rev (c6, c5, c4, c3, c2, c1));
all_tuple!(All7 => ((F1, c1), (F2, c2), (F3, c3), (F4, c4), (F5, c5), (F6, c6), (F7, c7)) rev (c7, c6, c5, c4, c3, c2, c1));
all_tuple!(All8 => ((F1, c1), (F2, c2), (F3, c3), (F4, c4), (F5, c5), (F6, c6), (F7, c7), (F8, c8)) rev (c8, c7, c6, c5, c4, c3, c2, c1));
