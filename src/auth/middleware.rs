use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::{
    TypedHeader,
    extract::CookieJar,
    headers::{Authorization, authorization::Bearer},
};
use log::debug;

use super::{Error, TOKEN_COOKIE, Verifier};

/// Resolves the signed-in user from a bearer token or the `token` cookie.
/// API calls without any token are rejected, page loads go to the sign-in page.
pub async fn authorize(
    verifier: State<Verifier>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> crate::Result<Response> {
    let token = bearer
        .map(|TypedHeader(Authorization(b))| b.token().to_owned())
        .or_else(|| jar.get(TOKEN_COOKIE).map(|c| c.value().to_owned()));

    let Some(token) = token else {
        if req.uri().path().starts_with("/api") {
            return Err(Error::Unauthorized.into());
        }
        debug!("No token present, redirecting to sign-in");
        return Ok(Redirect::to(verifier.sign_in_url()).into_response());
    };

    let user = verifier.verify(&token)?;
    debug!("Authorized {:?}", user.id());
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
