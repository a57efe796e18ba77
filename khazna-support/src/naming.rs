//! Bean-name derivation from type names.
//!
//! Beans registered without an explicit name, and dependency sites without an
//! explicit reference, are matched against names derived from their type:
//! either the short, uncapitalized type name (`userService`) or the full path.

/// Shortens a fully qualified type name for display and name derivation.
///
/// ```
/// use khazna_support::naming::shorten_type_name;
///
/// assert_eq!(shorten_type_name("my_app::services::user::UserService"), "UserService");
/// assert_eq!(shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"), "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Lowercases the first character, leaving the rest untouched.
///
/// ```
/// use khazna_support::naming::uncapitalize;
///
/// assert_eq!(uncapitalize("UserService"), "userService");
/// assert_eq!(uncapitalize(""), "");
/// ```
pub fn uncapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derives the conventional bean name for a type.
///
/// Generic arguments are dropped, so `Arc<dyn Logger>` becomes `arc`;
/// register such beans under an explicit name instead.
///
/// ```
/// use khazna_support::naming::bean_name_from_type;
///
/// assert_eq!(bean_name_from_type("app::repo::UserRepo", false), "userRepo");
/// assert_eq!(bean_name_from_type("app::repo::UserRepo", true), "app::repo::UserRepo");
/// ```
pub fn bean_name_from_type(full_name: &str, use_full_name: bool) -> String {
    if use_full_name {
        return full_name.to_string();
    }
    let short = shorten_type_name(full_name);
    let base = short.split('<').next().unwrap_or(&short);
    uncapitalize(base.trim())
}
