//! Localized strings.
//!
//! The extraction code needs exactly one user-facing string: the default
//! chapter title. Applications plug in their own string tables through
//! [`Localizer`]; [`EnglishStrings`] is the built-in fallback.

/// String id of the "Chapter {}" template.
pub const CHAPTER_TITLE: u32 = 25010;

/// Source of localized strings by numeric id.
pub trait Localizer: Send + Sync {
    /// The string for `id`, or an empty string if there is none.
    fn localized(&self, id: u32) -> String;
}

/// Built-in English strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishStrings;

impl Localizer for EnglishStrings {
    fn localized(&self, id: u32) -> String {
        match id {
            CHAPTER_TITLE => "Chapter {}".to_string(),
            _ => String::new(),
        }
    }
}

impl<F> Localizer for F
where
    F: Fn(u32) -> String + Send + Sync,
{
    fn localized(&self, id: u32) -> String {
        self(id)
    }
}

/// Default title for the `number`th chapter.
pub fn chapter_title(localizer: &dyn Localizer, number: usize) -> String {
    let template = localizer.localized(CHAPTER_TITLE);
    if template.contains("{}") {
        template.replacen("{}", &number.to_string(), 1)
    } else if template.trim().is_empty() {
        EnglishStrings
            .localized(CHAPTER_TITLE)
            .replacen("{}", &number.to_string(), 1)
    } else {
        format!("{} {number}", template.trim_end())
    }
}
