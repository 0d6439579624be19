use url::Url;

/// Rewrite configured update references into the referrals returned to a
/// caller. LDAP URLs lose any query or fragment so the referral covers the
/// whole namespace. Anything that isn't an LDAP URL is passed through as
/// configured. Blank entries are dropped.
pub fn referral_rewrite(refs: &[String]) -> Vec<String> {
    refs.iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| match Url::parse(r) {
            Ok(mut url) if matches!(url.scheme(), "ldap" | "ldaps" | "ldapi") => {
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            Ok(_) | Err(_) => {
                trace!(referral = %r, "referral kept verbatim");
                r.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_referral_rewrite() {
        assert_eq!(
            referral_rewrite(&refs(&["ldap://primary"])),
            refs(&["ldap://primary"])
        );
        assert_eq!(
            referral_rewrite(&refs(&["ldap://primary:389/dc=example??sub"])),
            refs(&["ldap://primary:389/dc=example"])
        );
        assert_eq!(
            referral_rewrite(&refs(&["  ", "not a url", "https://x.example/"])),
            refs(&["not a url", "https://x.example/"])
        );
        assert!(referral_rewrite(&refs(&[" "])).is_empty());
    }
}
