use tonic_build::manual::{Builder, Method, Service};

// (trait method, route name, request, response)
const AUTH_METHODS: &[(&str, &str, &str, &str)] = &[
    ("signup", "Signup", "SignupRequest", "SignupResponse"),
    ("signin", "Signin", "SigninRequest", "TokenResponse"),
    ("signout", "Signout", "Empty", "Empty"),
    (
        "refresh_token",
        "RefreshToken",
        "RefreshTokenRequest",
        "AccessTokenResponse",
    ),
    ("get_signin_user", "GetSigninUser", "Empty", "User"),
    (
        "get_google_login_url",
        "GetGoogleLoginURL",
        "Empty",
        "GoogleLoginUrlResponse",
    ),
    (
        "google_login_callback",
        "GoogleLoginCallback",
        "GoogleLoginCallbackRequest",
        "TokenResponse",
    ),
];

fn auth_service() -> Service {
    AUTH_METHODS
        .iter()
        .fold(
            Service::builder()
                .name("AuthService")
                .package("techfeed.v1"),
            |service, (name, route, input, output)| {
                service.method(
                    Method::builder()
                        .name(*name)
                        .route_name(*route)
                        .input_type(format!("crate::rpc::messages::{input}"))
                        .output_type(format!("crate::rpc::messages::{output}"))
                        .codec_path("tonic::codec::ProstCodec")
                        .build(),
                )
            },
        )
        .build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    built::write_built_file()?;

    // Generates `techfeed.v1.AuthService.rs` in OUT_DIR from hand-written prost messages,
    // so building does not depend on protoc.
    Builder::new().build_client(false).compile(&[auth_service()]);

    Ok(())
}
