//! Productivity logic that sits next to the todo list: pomodoro cycles and
//! focus selection.

pub mod focus;
pub mod pomodoro;
