//! The auto-classification rule engine
//!
//! Rules are tagged keyword tables evaluated strictly in order, first match
//! wins. The ordering encodes a real precedence: a licensed originator whose
//! actual job is finance or compliance must classify by function, not by
//! license possession. That is why non-origination title families sit above
//! the license rules.

use super::{Classification, ContactRole};
use tracing::trace;

/// One title family: a role and the lowercase keywords that imply it
struct TitleRule {
    role: ContactRole,
    keywords: &'static [&'static str],
}

/// Rule 1: non-origination job functions. Overrides license signals.
const NON_ORIGINATION_TITLES: &[TitleRule] = &[
    TitleRule {
        role: ContactRole::Finance,
        keywords: &[
            "controller",
            "accountant",
            "accounting",
            "finance",
            "cfo",
            "payroll",
            "bookkeeper",
        ],
    },
    TitleRule {
        role: ContactRole::HumanResources,
        keywords: &["human resources", "hr manager", "hr director", "recruiter", "talent"],
    },
    TitleRule {
        role: ContactRole::Compliance,
        keywords: &["compliance", "auditor", "quality control", "risk officer"],
    },
    TitleRule {
        role: ContactRole::Operations,
        keywords: &["operations", "ops manager"],
    },
    TitleRule {
        role: ContactRole::Admin,
        keywords: &[
            "administrative",
            "administrator",
            "receptionist",
            "office manager",
            "executive assistant",
        ],
    },
    TitleRule {
        role: ContactRole::Marketing,
        keywords: &["marketing", "social media", "brand manager"],
    },
    TitleRule {
        role: ContactRole::It,
        keywords: &[
            "information technology",
            "it support",
            "it manager",
            "software",
            "systems admin",
            "help desk",
            "network engineer",
        ],
    },
];

/// Rule 2: origination-adjacent functions inside a lender
const ORIGINATION_TITLES: &[TitleRule] = &[
    TitleRule {
        role: ContactRole::Processor,
        keywords: &["processor", "processing"],
    },
    TitleRule {
        role: ContactRole::Underwriter,
        keywords: &["underwriter", "underwriting"],
    },
    TitleRule {
        role: ContactRole::Closer,
        keywords: &["closer", "funder"],
    },
    TitleRule {
        role: ContactRole::BranchManager,
        keywords: &["branch manager", "sales manager", "area manager"],
    },
    TitleRule {
        role: ContactRole::LoanOfficer,
        keywords: &[
            "loan officer",
            "loan originator",
            "mortgage advisor",
            "mortgage consultant",
            "mortgage banker",
            "mlo",
        ],
    },
];

/// Rule 3: external transaction partners
const PARTNER_TITLES: &[TitleRule] = &[
    TitleRule {
        role: ContactRole::Realtor,
        keywords: &[
            "realtor",
            "real estate agent",
            "real estate broker",
            "listing agent",
            "buyer's agent",
            "real estate",
        ],
    },
    TitleRule {
        role: ContactRole::TitleEscrow,
        keywords: &["escrow officer", "title officer", "escrow", "title agent"],
    },
    TitleRule {
        role: ContactRole::Attorney,
        keywords: &["attorney", "lawyer", "paralegal", "counsel", "esq"],
    },
    TitleRule {
        role: ContactRole::Insurance,
        keywords: &["insurance"],
    },
    TitleRule {
        role: ContactRole::Appraiser,
        keywords: &["appraiser", "appraisal"],
    },
];

/// Rule 6: lending vocabulary in the address domain or company name
const LENDING_DOMAIN_KEYWORDS: &[&str] = &[
    "mortgage", "lending", "homeloan", "loans", "lender", "funding",
];

/// Accumulated evidence for one address
#[derive(Debug, Clone, Default)]
pub struct ClassifierInput<'a> {
    /// Job title candidates, best first
    pub titles: Vec<&'a str>,
    /// Company name candidates
    pub companies: Vec<&'a str>,
    /// Lender-side (NMLS) license numbers
    pub nmls_licenses: Vec<&'a str>,
    /// Agent-side license numbers
    pub agent_licenses: Vec<&'a str>,
    /// Domain part of the address, e.g. `examplelending.com`
    pub domain: Option<&'a str>,
}

impl<'a> ClassifierInput<'a> {
    pub fn for_address(address: &'a str) -> Self {
        Self {
            domain: address.rsplit('@').next(),
            ..Default::default()
        }
    }
}

/// Maps accumulated signals to a role with a confidence score
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoClassifier;

impl AutoClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Returns `None` when no rule matches: insufficient signal, keep prior.
    pub fn classify(&self, input: &ClassifierInput<'_>) -> Option<Classification> {
        // Rules 1-3: title families, in precedence order
        for (table, confidence) in [
            (NON_ORIGINATION_TITLES, 0.95),
            (ORIGINATION_TITLES, 0.95),
            (PARTNER_TITLES, 0.95),
        ] {
            if let Some(c) = match_titles(table, &input.titles, confidence) {
                trace!(role = %c.role, signal = %c.signal, "Title rule matched");
                return Some(c);
            }
        }

        // Rule 4: a lender license alone does not confirm the current role
        if let Some(number) = input.nmls_licenses.first() {
            return Some(Classification::new(
                ContactRole::LoanOfficer,
                0.85,
                format!("nmls_license:{}", number),
            ));
        }

        // Rule 5: an agent license has no legitimate override scenario
        if let Some(number) = input.agent_licenses.first() {
            return Some(Classification::new(
                ContactRole::Realtor,
                1.0,
                format!("agent_license:{}", number),
            ));
        }

        // Rule 6: lending vocabulary in the domain or company
        let domain = input.domain.unwrap_or_default().to_lowercase();
        let companies: Vec<String> = input.companies.iter().map(|c| c.to_lowercase()).collect();
        for keyword in LENDING_DOMAIN_KEYWORDS {
            if domain.contains(keyword) || companies.iter().any(|c| c.contains(keyword)) {
                return Some(Classification::new(
                    ContactRole::LenderEmployee,
                    0.85,
                    format!("domain:{}", keyword),
                ));
            }
        }

        None
    }
}

fn match_titles(
    table: &[TitleRule],
    titles: &[&str],
    confidence: f64,
) -> Option<Classification> {
    for title in titles {
        let title = title.to_lowercase();
        for rule in table {
            for keyword in rule.keywords {
                if title.contains(keyword) {
                    return Some(Classification::new(
                        rule.role,
                        confidence,
                        format!("title:{}", keyword),
                    ));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn classify(input: &ClassifierInput<'_>) -> Option<Classification> {
        AutoClassifier::new().classify(input)
    }

    #[parameterized(
        controller = { "Controller", ContactRole::Finance },
        staff_accountant = { "Staff Accountant", ContactRole::Finance },
        hr = { "HR Manager", ContactRole::HumanResources },
        compliance = { "VP of Compliance", ContactRole::Compliance },
        office_manager = { "Office Manager", ContactRole::Admin },
        marketing = { "Marketing Coordinator", ContactRole::Marketing },
        it_support = { "IT Support Specialist", ContactRole::It },
        processor = { "Senior Loan Processor", ContactRole::Processor },
        underwriter = { "Underwriter II", ContactRole::Underwriter },
        loan_officer = { "Loan Officer", ContactRole::LoanOfficer },
        branch_manager = { "Branch Manager", ContactRole::BranchManager },
        realtor = { "REALTOR(R)", ContactRole::Realtor },
        escrow = { "Escrow Officer", ContactRole::TitleEscrow },
        attorney = { "Attorney at Law", ContactRole::Attorney },
        insurance = { "Insurance Agent", ContactRole::Insurance },
        appraiser = { "Certified Residential Appraiser", ContactRole::Appraiser },
    )]
    fn test_title_families(title: &str, expected: ContactRole) {
        let input = ClassifierInput {
            titles: vec![title],
            ..Default::default()
        };
        let c = classify(&input).unwrap();
        assert_eq!(c.role, expected);
        assert_eq!(c.confidence, 0.95);
        assert!(c.signal.starts_with("title:"));
    }

    #[test]
    fn test_controller_with_nmls_license_is_finance_not_loan_officer() {
        // The precedence property: function beats license possession
        let input = ClassifierInput {
            titles: vec!["Controller"],
            nmls_licenses: vec!["123456"],
            ..Default::default()
        };
        let c = classify(&input).unwrap();
        assert_eq!(c.role, ContactRole::Finance);
        assert_eq!(c.confidence, 0.95);
    }

    #[test]
    fn test_nmls_license_alone_is_085() {
        let input = ClassifierInput {
            nmls_licenses: vec!["987654"],
            ..Default::default()
        };
        let c = classify(&input).unwrap();
        assert_eq!(c.role, ContactRole::LoanOfficer);
        assert_eq!(c.confidence, 0.85);
        assert_eq!(c.signal, "nmls_license:987654");
    }

    #[test]
    fn test_agent_license_is_definitive() {
        let input = ClassifierInput {
            agent_licenses: vec!["01234567"],
            ..Default::default()
        };
        let c = classify(&input).unwrap();
        assert_eq!(c.role, ContactRole::Realtor);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_nmls_checked_before_agent_license() {
        // Both licenses present: evaluation order gives the lender rule first
        let input = ClassifierInput {
            nmls_licenses: vec!["111"],
            agent_licenses: vec!["222"],
            ..Default::default()
        };
        let c = classify(&input).unwrap();
        assert_eq!(c.role, ContactRole::LoanOfficer);
    }

    #[test]
    fn test_domain_heuristic() {
        let input = ClassifierInput::for_address("bob@summitmortgage.com");
        let c = classify(&input).unwrap();
        assert_eq!(c.role, ContactRole::LenderEmployee);
        assert_eq!(c.confidence, 0.85);
        assert_eq!(c.signal, "domain:mortgage");
    }

    #[test]
    fn test_company_vocabulary_counts_for_domain_rule() {
        let input = ClassifierInput {
            companies: vec!["Evergreen Lending Group"],
            ..Default::default()
        };
        let c = classify(&input).unwrap();
        assert_eq!(c.role, ContactRole::LenderEmployee);
    }

    #[test]
    fn test_no_signal_returns_none() {
        let input = ClassifierInput::for_address("jane.doe@example.com");
        assert!(classify(&input).is_none());
    }

    #[test]
    fn test_title_beats_domain() {
        let mut input = ClassifierInput::for_address("sue@summitmortgage.com");
        input.titles = vec!["Escrow Officer"];
        let c = classify(&input).unwrap();
        assert_eq!(c.role, ContactRole::TitleEscrow);
        assert_eq!(c.confidence, 0.95);
    }
}
