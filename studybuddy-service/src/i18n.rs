use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};
use unic_langid::LanguageIdentifier;

/// Internationalization service using Fluent (thread-safe)
pub struct I18n {
    bundles: RwLock<HashMap<String, FluentBundle<FluentResource>>>,
    default_locale: String,
}

impl I18n {
    /// Create a new i18n service with embedded English translations
    pub fn new() -> Self {
        let i18n = Self {
            bundles: RwLock::new(HashMap::new()),
            default_locale: "en".to_string(),
        };

        i18n.load_embedded_en();

        i18n
    }

    /// Add a locale with translations
    pub fn add_locale(&self, locale: &str, content: &str) -> Result<(), String> {
        let lang_id: LanguageIdentifier = locale
            .parse()
            .map_err(|e| format!("Invalid locale '{}': {}", locale, e))?;

        let resource = FluentResource::try_new(content.to_string())
            .map_err(|(_, errors)| format!("Failed to parse Fluent resource: {:?}", errors))?;

        let mut bundle = FluentBundle::new_concurrent(vec![lang_id]);
        bundle
            .add_resource(resource)
            .map_err(|errors| format!("Failed to add resource to bundle: {:?}", errors))?;

        let mut bundles = self
            .bundles
            .write()
            .map_err(|_| "Translation store lock poisoned".to_string())?;
        bundles.insert(locale.to_string(), bundle);

        debug!(locale = %locale, "Loaded translations");

        Ok(())
    }

    /// Get a translated message
    pub fn get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> String {
        // Requested locale, then default, then the key itself
        self.try_get(locale, key, args)
            .or_else(|| self.try_get(&self.default_locale, key, args))
            .unwrap_or_else(|| key.to_string())
    }

    fn try_get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> Option<String> {
        let bundles = self.bundles.read().ok()?;
        let bundle = bundles.get(locale)?;
        let message = bundle.get_message(key)?;
        let pattern = message.value()?;

        let mut errors = vec![];
        let result = bundle.format_pattern(pattern, args, &mut errors);

        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Fluent formatting errors");
        }

        Some(result.to_string())
    }

    /// Get a translated message with arguments
    pub fn format(&self, locale: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (k, v) in args {
            fluent_args.set(*k, *v);
        }
        self.get(locale, key, Some(&fluent_args))
    }

    fn load_embedded_en(&self) {
        let en_translations = r#"
# StudyBuddy Service - English Translations

# Errors
error-quiz-not-found = Quiz not found
error-doubt-not-found = Doubt not found
error-file-not-found = File not found
error-invalid-credentials = Incorrect username or password
error-invalid-token = Could not validate credentials
error-email-taken = Email already registered
error-username-taken = Username already registered
error-file-too-large = File too large. Maximum size is { $max_mb }MB
error-too-many-sections = Document is too large. Maximum { $max } sections allowed.
error-not-enough-time = Not enough time remaining to process the document. Please try a smaller document.
error-no-questions-in-time = Could not generate any questions within the time limit. Please try a smaller document.
error-internal = An internal error occurred
error-empty-document = No readable text was found in the document
error-question-required = Question is required
error-invalid-limit = limit must be at least 1
error-invalid-account = A valid email, username and password are required

# Quiz generation
quiz-partial-timeout = Only processed { $processed } of { $total } sections due to time constraints
quiz-partial-budget = Some sections produced fewer questions than requested
quiz-save-failed = Quiz generated but could not be saved to your history

# Doubts
doubt-empty-answer = I apologize, but I couldn't generate a proper response. Please try rephrasing your question.
quiz-attempt-recorded = Quiz attempt saved successfully

# Root
root-greeting = Hello World
"#;

        if let Err(e) = self.add_locale("en", en_translations) {
            warn!(error = %e, "Failed to load embedded English translations");
        }
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new()
    }
}
