//! The envelope dispatched through the state hierarchy.
use std::any::Any;

/// A lightweight, single-owner envelope. `what` is a plain integer tag so
/// clients can use externally-defined command codes without binding to an
/// enum the engine would have to know about.
pub struct Message {
    pub what: i32,
    pub arg1: Option<i32>,
    pub arg2: Option<i32>,
    pub obj: Option<Box<dyn Any + Send>>,
}

impl Message {
    pub fn new(what: i32) -> Self {
        Message {
            what,
            arg1: None,
            arg2: None,
            obj: None,
        }
    }

    pub fn with_arg1(mut self, arg1: i32) -> Self {
        self.arg1 = Some(arg1);
        self
    }

    pub fn with_arg2(mut self, arg2: i32) -> Self {
        self.arg2 = Some(arg2);
        self
    }

    pub fn with_obj(mut self, obj: Box<dyn Any + Send>) -> Self {
        self.obj = Some(obj);
        self
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("what", &self.what)
            .field("arg1", &self.arg1)
            .field("arg2", &self.arg2)
            .field("has_obj", &self.obj.is_some())
            .finish()
    }
}

/// Synthetic tag recorded for lifecycle log entries that weren't triggered
/// by a client `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag {
    What(i32),
    Enter,
    Exit,
    OnQuitting,
}

/// A snapshot of the message currently being dispatched, returned by
/// `Machine::get_current_message`. Carries the scalar fields only: `obj` is
/// borrowed for the lifetime of the dispatch and isn't `Clone`, so it is
/// reachable only through the `&Message` handed to the hook itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentMessage {
    pub what: i32,
    pub arg1: Option<i32>,
    pub arg2: Option<i32>,
}

impl From<&Message> for CurrentMessage {
    fn from(m: &Message) -> Self {
        CurrentMessage {
            what: m.what,
            arg1: m.arg1,
            arg2: m.arg2,
        }
    }
}
