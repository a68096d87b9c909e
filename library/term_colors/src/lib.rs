//! term_colors is a small grab bag of helpers for splashing ANSI color onto
//! log entries. By convention pod names are logged in [cyan](cyan), pool and
//! tier names in [purple](purple), healthy transitions in [green](green),
//! unhealthy ones in [red](red), and durations in [orange](orange).

use ansi_term::{ANSIGenericString, Color, Style};
use std::borrow::Cow;

macro_rules! color_fn {
    ($name:ident, $color:expr) => {
        pub fn $name<'a, I, S: 'a + ToOwned + ?Sized>(input: I) -> ANSIGenericString<'a, S>
        where
            I: Into<Cow<'a, S>>,
            <S as ToOwned>::Owned: std::fmt::Debug,
        {
            $color.paint(input)
        }
    };
}

color_fn!(cyan, Color::Cyan);
color_fn!(green, Color::Green);
color_fn!(red, Color::Red);
color_fn!(blue, Color::Blue);
color_fn!(purple, Color::Purple);
color_fn!(yellow, Color::Yellow);
color_fn!(orange, Color::RGB(243, 113, 33));

pub fn bold<'a, I, S: 'a + ToOwned + ?Sized>(input: I) -> ANSIGenericString<'a, S>
where
    I: Into<Cow<'a, S>>,
    <S as ToOwned>::Owned: std::fmt::Debug,
{
    Style::new().bold().paint(input)
}
