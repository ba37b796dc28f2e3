/*!
Account records as they sit in the account file.
*/

/// Column names of the account file, in the order they are written.
pub const COLUMNS: [&str; 16] = [
    "Email",
    "PasswordHash",
    "FullName",
    "PhoneNumber",
    "Address",
    "Extracurriculars",
    "ScheduleConsistency",
    "LeaveForSchoolTime",
    "FinishExtracurriculars",
    "Role",
    "DrivingDuration",
    "Accidents",
    "Insured",
    "Responsible",
    "ParentContactInfo",
    "PaymentMethod",
];

pub const N_COLUMNS: usize = COLUMNS.len();

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Role {
    Driver,
    Passenger,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Driver    => "driver",
            Role::Passenger => "passenger",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Case-sensitive; "Driver" is not a `Role`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driver"    => Ok(Role::Driver),
            "passenger" => Ok(Role::Passenger),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

/**
One row of the account file.

Every field is kept as the text that was (or will be) stored, `role`
included, so that rows written by older versions survive a rewrite
untouched. Use `Account::role()` for the typed view.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Account {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone_number: String,
    pub address: String,
    pub extracurriculars: String,
    pub schedule_consistency: String,
    pub leave_for_school_time: String,
    pub finish_extracurriculars: String,
    pub role: String,
    pub driving_duration: String,
    pub accidents: String,
    pub insured: String,
    pub responsible: String,
    pub parent_contact_info: String,
    pub payment_method: String,
}

impl Account {
    /**
    Build an `Account` from decoded row fields.

    Short rows are padded with empty fields and long rows lose their
    extra fields, so a field always lands in its own column.
    */
    pub fn from_fields(fields: Vec<String>) -> Account {
        let mut it = fields.into_iter();
        let mut next = || it.next().unwrap_or_default();

        Account {
            email: next(),
            password_hash: next(),
            full_name: next(),
            phone_number: next(),
            address: next(),
            extracurriculars: next(),
            schedule_consistency: next(),
            leave_for_school_time: next(),
            finish_extracurriculars: next(),
            role: next(),
            driving_duration: next(),
            accidents: next(),
            insured: next(),
            responsible: next(),
            parent_contact_info: next(),
            payment_method: next(),
        }
    }

    /// The fields in column order.
    pub fn fields(&self) -> [&str; N_COLUMNS] {
        [
            &self.email,
            &self.password_hash,
            &self.full_name,
            &self.phone_number,
            &self.address,
            &self.extracurriculars,
            &self.schedule_consistency,
            &self.leave_for_school_time,
            &self.finish_extracurriculars,
            &self.role,
            &self.driving_duration,
            &self.accidents,
            &self.insured,
            &self.responsible,
            &self.parent_contact_info,
            &self.payment_method,
        ]
    }

    /// Look a field up by its column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        COLUMNS.iter()
            .position(|c| *c == column)
            .map(|n| self.fields()[n])
    }

    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }

    /// Serialized row, without a line terminator.
    pub fn to_row(&self) -> String {
        crate::codec::encode_row(self.fields())
    }
}

/// True if decoded `fields` look like the column-name row.
pub fn is_header(fields: &[String]) -> bool {
    let has = |name: &str| fields.iter()
        .any(|f| f.to_ascii_lowercase().contains(name));
    has("email") && has("passwordhash")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn short_rows_are_padded() {
        let a = Account::from_fields(vec![
            "a@mchs.org".to_owned(),
            "$2b$10$hash".to_owned(),
            "A".to_owned(),
        ]);
        assert_eq!(a.email, "a@mchs.org");
        assert_eq!(a.full_name, "A");
        assert_eq!(a.payment_method, "");
        assert_eq!(a.fields().len(), N_COLUMNS);
    }

    #[test]
    fn long_rows_are_truncated() {
        let mut fields: Vec<String> = (0..20).map(|n| n.to_string()).collect();
        fields[9] = "driver".to_owned();
        let a = Account::from_fields(fields);
        assert_eq!(a.payment_method, "15");
        assert_eq!(a.role(), Some(Role::Driver));
    }

    #[test]
    fn rows_round_trip() {
        let a = Account {
            email: "b@mchs.org".to_owned(),
            full_name: "Bee, \"Buzz\"".to_owned(),
            extracurriculars: "Band\nRobotics".to_owned(),
            role: "passenger".to_owned(),
            ..Default::default()
        };
        let back = Account::from_fields(codec::decode(&a.to_row()));
        assert_eq!(a, back);
        assert_eq!(back.get("FullName"), Some("Bee, \"Buzz\""));
        assert_eq!(back.get("Nope"), None);
    }

    #[test]
    fn role_parsing_is_exact() {
        assert_eq!("passenger".parse::<Role>(), Ok(Role::Passenger));
        assert!("Driver".parse::<Role>().is_err());
        assert_eq!(Role::Driver.to_string(), "driver");
    }

    #[test]
    fn header_detection() {
        let header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
        assert!(is_header(&header));
        let row = vec!["a@mchs.org".to_owned(), "$2b$10$xyz".to_owned()];
        assert!(!is_header(&row));
    }
}
