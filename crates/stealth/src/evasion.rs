//! Init script that hides the usual automation tells from page scripts.

use crate::config::StealthProfile;

const EVASION_TEMPLATE: &str = r#"(() => {
    const languages = __LANGUAGES__;
    const define = (target, key, getter) => {
        try {
            Object.defineProperty(target, key, { get: getter, configurable: true });
        } catch (_) {}
    };

    define(Navigator.prototype, 'webdriver', () => undefined);
    define(Navigator.prototype, 'languages', () => languages.slice());

    if (!window.chrome) {
        window.chrome = {};
    }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {};
    }

    const fakePlugins = [
        { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
        { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
        { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' },
    ];
    define(Navigator.prototype, 'plugins', () => fakePlugins);

    if (window.navigator.permissions && window.navigator.permissions.query) {
        const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);
        window.navigator.permissions.query = (parameters) =>
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery(parameters);
    }

    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function (parameter) {
        if (parameter === 37445) { return 'Intel Inc.'; }
        if (parameter === 37446) { return 'Intel Iris OpenGL Engine'; }
        return getParameter.call(this, parameter);
    };
})();"#;

/// Render the evasion script for `profile`.
pub fn evasion_script(profile: &StealthProfile) -> String {
    let languages =
        serde_json::to_string(&profile.languages()).unwrap_or_else(|_| "[\"en-US\"]".into());
    EVASION_TEMPLATE.replace("__LANGUAGES__", &languages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_profile_languages() {
        let script = evasion_script(&StealthProfile::desktop_chrome());
        assert!(script.contains(r#"const languages = ["en-IN","en"];"#));
        assert!(script.contains("'webdriver'"));
        assert!(!script.contains("__LANGUAGES__"));
    }
}
