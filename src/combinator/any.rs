//! Race futures over fixed tuples of child coroutines.

use super::{ChildSlot, IntoAny};
use std::future::Future;
use std::panic::resume_unwind;
use std::pin::Pin;
use std::task::{Context, Poll};

macro_rules! any_tuple {
    ($Any:ident => ($(($idx:tt, $F:ident, $slot:ident)),+) rev ($(($ridx:tt, $rslot:ident)),+)) => {
        /// Race over a fixed tuple of child coroutines.
        ///
        /// Completes with the first child to settle; the output tuple holds
        /// `Some` only at the winner's position. Losers are destroyed in
        /// reverse argument order before the result is observed.
        pub struct $Any<$($F: Future),+> {
            $($slot: ChildSlot<$F>,)+
        }

        impl<$($F: Future),+> Unpin for $Any<$($F),+> {}

        impl<$($F: Future),+> Future for $Any<$($F),+> {
            type Output = ($(Option<$F::Output>,)+);

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let this = self.get_mut();
                let mut winner: Option<usize> = None;
                $(
                    if winner.is_none() {
                        this.$slot.poll_advance(cx);
                        if this.$slot.is_settled() {
                            winner = Some($idx);
                        }
                    }
                )+
                let Some(winner) = winner else {
                    return Poll::Pending;
                };
                // Losers tear down first, in reverse argument order; their
                // wait records leave the queues before the winner's result
                // is even looked at.
                $(
                    if $ridx != winner {
                        this.$rslot.cancel();
                    }
                )+
                Poll::Ready(($(
                    if $idx == winner {
                        match this.$slot.take_settled() {
                            Ok(value) => Some(value),
                            Err(payload) => resume_unwind(payload.into_unwind()),
                        }
                    } else {
                        None
                    },
                )+))
            }
        }

        impl<$($F: Future),+> Drop for $Any<$($F),+> {
            fn drop(&mut self) {
                // Reverse argument order.
                $(self.$rslot.cancel();)+
            }
        }

        impl<$($F: Future),+> IntoAny for ($($F,)+) {
            type Future = $Any<$($F),+>;

            fn into_any(self) -> Self::Future {
                let ($($slot,)+) = self;
                $Any {
                    $($slot: ChildSlot::new($slot),)+
                }
            }
        }
    };
}

any_tuple!(Any1 => ((0, F1, c1)) rev ((0, c1)));
any_tuple!(Any2 => ((0, F1, c1), (1, F2, c2)) rev ((1, c2), (0, c1)));
any_tuple!(Any3 => ((0, F1, c1), (1, F2, c2), (2, F3, c3)) rev ((2, c3), (1, c2), (0, c1)));
any_tuple!(Any4 => ((0, F1, c1), (1, F2, c2), (2, F3, c3), (3, F4, c4)) rev ((3, c4), (2, c3), (1, c2), (0, c1)));
any_tuple!(Any5 => ((0, F1, c1), (1, F2, c2), (2, F3, c3), (3, F4, c4), (4, F5, c5)) rev ((4, c5), (3, c4), (2, c3), (1, c2), (0, c1)));
any_tuple!(Any6 => ((0, F1, c1), (1, F2, c2), (2, F3, c3), (3, F4, c4), (4, F5, c5), (5, F6, c6)) rev ((5, c6), (4, c5), (3, c4), (2, c3), (1, c2), (0, c1)));
any_tuple!(Any7 => ((0, F1, c1), (1, F2, c2), (2, F3, c3), (3, F4, c4), (4, F5, c5), (5, F6, c6), (6, F7, c7)) rev ((6, c7), (5, c6), (4, c5), (3, c4), (2, c3), (1, c2), (0, c1)));
any_tuple!(Any8 => ((0, F1, c1), (1, F2, c2), (2, F3, c3), (3, F4, c4), (4, F5, c5), (5, F6, c6), (6, F7, c7), (7, F8, c8)) rev ((7, c8), (6, c7), (5, c6), (4, c5), (3, c4), (2, c3), (1, c2), (0, c1)));
