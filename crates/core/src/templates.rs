use crate::models::Language;

pub const DEFAULT_APPLICATION_ISSUE: &str = "accumulation of garbage";
pub const DEFAULT_APPLICATION_LOCATION: &str = "___________";

pub fn render_complaint_text(language: Language, issue: &str, location: &str) -> String {
    match language {
        Language::En => format!("Complaint: {issue}, Location: {location}"),
        Language::Hi => format!("शिकायत: {issue}, स्थान: {location}"),
        Language::Ta => format!("புகார்: {issue}, இடம்: {location}"),
        Language::Bn => format!("অভিযোগ: {issue}, অবস্থান: {location}"),
        Language::Ur => format!("شکایت: {issue}, مقام: {location}"),
    }
}

/// Letter to the municipal commissioner. Only the subject line varies.
pub fn render_application_letter(issue: Option<&str>, location: Option<&str>) -> String {
    let issue = issue.unwrap_or(DEFAULT_APPLICATION_ISSUE);
    let location = location.unwrap_or(DEFAULT_APPLICATION_LOCATION);

    format!(
        "To
The Municipal Commissioner,
[Name of Municipal Corporation]
[City Name]

Subject: Complaint regarding {issue} at {location}

Respected Sir/Madam,

I, ______________________________________ (Name),
residing at ______________________________________ (Full Address),
Mobile No.: ______________________,
Email: __________________________,

wish to bring to your kind notice that there is an accumulation of garbage at the above-mentioned location.
This not only causes foul odor and breeding of disease-carrying vectors, but also poses a serious health and environmental hazard to local residents.

Kindly take immediate action to clear this waste and arrange for regular disposal.

Thank you for your prompt attention.

Date: ________________            Signature: ________________"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tamil_template_interpolates_fields() {
        let text = render_complaint_text(Language::Ta, "garbage", "MG Road");
        assert_eq!(text, "புகார்: garbage, இடம்: MG Road");
    }

    #[test]
    fn application_defaults_fill_subject() {
        let letter = render_application_letter(None, None);
        assert!(letter.contains("Subject: Complaint regarding accumulation of garbage at ___________"));
        assert!(letter.starts_with("To\n"));
    }

    #[test]
    fn application_uses_given_fields() {
        let letter = render_application_letter(Some("sewage"), Some("Ward 12"));
        assert!(letter.contains("Complaint regarding sewage at Ward 12"));
    }
}
