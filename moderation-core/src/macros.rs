//! Declarative glue between an aggregate and its event enum.

/// Declare an aggregate's event enum and wire it into the engine.
///
/// Generates, for the listed `Variant(Payload)` pairs:
///
/// - the event enum itself, carrying any attributes given before it
/// - [`EventKind`](crate::event::EventKind),
///   [`SerializableEvent`](crate::event::SerializableEvent) and
///   [`ProjectionEvent`](crate::event::ProjectionEvent) by payload kind
/// - `From<Payload>` for each variant
/// - [`Aggregate`](crate::aggregate::Aggregate), whose `apply` dispatches to
///   the per-event [`Apply`](crate::aggregate::Apply) impls
///
/// Every payload must implement [`DomainEvent`](crate::event::DomainEvent)
/// and the aggregate must implement `Apply<Payload>` for each of them.
///
/// ```ignore
/// moderation_core::impl_aggregate! {
///     Comment {
///         kind: "comment",
///         id: Uuid,
///         error: CommentError,
///         event:
///             #[derive(Clone, Debug, PartialEq, Eq)]
///             pub enum CommentEvent {
///                 Created(CommentCreated),
///                 Approved(CommentApproved),
///             }
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_aggregate {
    (
        $aggregate:ident {
            kind: $kind:literal,
            id: $id:ty,
            error: $error:ty,
            event:
                $(#[$meta:meta])*
                $vis:vis enum $event:ident {
                    $($variant:ident($payload:ty)),+ $(,)?
                }
        }
    ) => {
        $(#[$meta])*
        $vis enum $event {
            $(
                #[doc = concat!("[`", stringify!($payload), "`]")]
                $variant($payload),
            )+
        }

        impl $crate::event::EventKind for $event {
            fn kind(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => <$payload as $crate::event::DomainEvent>::KIND,)+
                }
            }
        }

        impl $crate::event::SerializableEvent for $event {
            fn to_data(&self) -> ::core::result::Result<
                $crate::__private::serde_json::Value,
                $crate::__private::serde_json::Error,
            > {
                match self {
                    $(Self::$variant(event) => $crate::__private::serde_json::to_value(event),)+
                }
            }
        }

        impl $crate::event::ProjectionEvent for $event {
            const EVENT_KINDS: &'static [&'static str] =
                &[$(<$payload as $crate::event::DomainEvent>::KIND),+];

            fn from_stored(
                kind: &str,
                data: &$crate::__private::serde_json::Value,
            ) -> ::core::result::Result<Self, $crate::event::EventDecodeError> {
                $(
                    if kind == <$payload as $crate::event::DomainEvent>::KIND {
                        return $crate::event::decode::<$payload>(data).map(Self::$variant);
                    }
                )+
                Err($crate::event::EventDecodeError::UnknownKind {
                    kind: kind.to_string(),
                    expected: <Self as $crate::event::ProjectionEvent>::EVENT_KINDS,
                })
            }
        }

        $(
            impl ::core::convert::From<$payload> for $event {
                fn from(event: $payload) -> Self {
                    Self::$variant(event)
                }
            }
        )+

        impl $crate::aggregate::Aggregate for $aggregate {
            const KIND: &'static str = $kind;

            type Error = $error;
            type Event = $event;
            type Id = $id;

            fn apply(&mut self, event: &Self::Event) {
                match event {
                    $($event::$variant(event) => {
                        <Self as $crate::aggregate::Apply<$payload>>::apply(self, event);
                    })+
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use crate::{
        aggregate::{Aggregate, Apply},
        event::{DomainEvent, EventDecodeError, EventKind, ProjectionEvent, SerializableEvent},
    };

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Lit {
        colour: String,
    }

    impl DomainEvent for Lit {
        const KIND: &'static str = "lamp.lit";
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Dimmed;

    impl DomainEvent for Dimmed {
        const KIND: &'static str = "lamp.dimmed";
    }

    #[derive(Debug, Default)]
    struct Lamp {
        colour: Option<String>,
    }

    impl Apply<Lit> for Lamp {
        fn apply(&mut self, event: &Lit) {
            self.colour = Some(event.colour.clone());
        }
    }

    impl Apply<Dimmed> for Lamp {
        fn apply(&mut self, _: &Dimmed) {
            self.colour = None;
        }
    }

    crate::impl_aggregate! {
        Lamp {
            kind: "lamp",
            id: u8,
            error: String,
            event:
                #[derive(Clone, Debug, PartialEq, Eq)]
                enum LampEvent {
                    Lit(Lit),
                    Dimmed(Dimmed),
                }
        }
    }

    fn lit() -> LampEvent {
        Lit {
            colour: "amber".to_string(),
        }
        .into()
    }

    #[test]
    fn kinds_follow_payloads() {
        assert_eq!(Lamp::KIND, "lamp");
        assert_eq!(lit().kind(), "lamp.lit");
        assert_eq!(LampEvent::EVENT_KINDS, &["lamp.lit", "lamp.dimmed"]);
    }

    #[test]
    fn apply_dispatches_to_payload_impls() {
        let mut lamp = Lamp::default();
        Aggregate::apply(&mut lamp, &lit());
        assert_eq!(lamp.colour.as_deref(), Some("amber"));
        Aggregate::apply(&mut lamp, &LampEvent::from(Dimmed));
        assert_eq!(lamp.colour, None);
    }

    #[test]
    fn stored_payload_decodes_back() {
        let data = lit().to_data().unwrap();
        let decoded = LampEvent::from_stored("lamp.lit", &data).unwrap();
        assert_eq!(decoded, lit());
    }

    #[test]
    fn unknown_kind_lists_expected_kinds() {
        let err = LampEvent::from_stored("lamp.smashed", &serde_json::Value::Null).unwrap_err();
        assert!(matches!(
            err,
            EventDecodeError::UnknownKind { ref kind, expected }
                if kind == "lamp.smashed" && expected.len() == 2
        ));
    }
}
