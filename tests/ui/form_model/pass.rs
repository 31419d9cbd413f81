use filledout::form::{FieldLens, Form, FormConfig, FormModel};

#[derive(Clone, Debug, PartialEq, FormModel)]
struct Address {
    city: String,
    postal_code: String,
}

#[derive(Clone, Debug, PartialEq, FormModel)]
struct SignupForm {
    email: String,
    #[form(nested)]
    address: Address,
    tags: Vec<String>,
}

fn main() {
    let lens = SignupFormEmailLens;
    let mut model = SignupForm {
        email: "a@filled.out".to_string(),
        address: Address {
            city: "Oslo".to_string(),
            postal_code: "0150".to_string(),
        },
        tags: vec!["rust".to_string()],
    };
    lens.set(&mut model, "b@filled.out".to_string());
    assert_eq!(lens.name().as_str(), "email");
    assert_eq!(lens.get(&model), "b@filled.out");
    assert_eq!(AddressPostalCodeLens.name().as_str(), "postal_code");

    let form = Form::new(model, FormConfig::default()).expect("form");
    let fields = form.fields();
    assert_eq!(fields.address.city.name().as_str(), "address.city");
    assert_eq!(fields.address.field().name().as_str(), "address");
    fields.tags.push("gpui".to_string());
    assert_eq!(fields.tags.len(), 2);
}
