use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BrandRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierRequest {
    pub name: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}
